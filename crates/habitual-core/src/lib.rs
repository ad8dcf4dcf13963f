//! # habitual-core
//!
//! Core types, traits, configuration, and error handling for Habitual.

pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod traits;

pub use config::shellexpand;

//! # habitual-channels
//!
//! Messaging platform integrations for Habitual.

pub mod telegram;
pub(crate) mod utils;

//! # habitual-memory
//!
//! Persistent store for Habitual (SQLite-backed).

pub mod store;

pub use store::Store;

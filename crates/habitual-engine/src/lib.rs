//! # habitual-engine
//!
//! The stateful parts of Habitual: the reminder scheduler, the streak and
//! completion statistics, and the membership verification cache.

pub mod membership;
pub mod scheduler;
pub mod stats;

pub use membership::MembershipCache;
pub use scheduler::{ReconcileReport, Scheduler};
pub use stats::{HabitStats, Stats};

#[cfg(test)]
pub(crate) mod testutil;

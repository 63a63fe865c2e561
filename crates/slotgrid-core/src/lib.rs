//! slotgrid-core — shared domain types for the SlotGrid scheduler.
//!
//! Leaf crate with no scheduling behavior. Defines the task-type
//! vocabulary, job priorities, pool configuration, and the job
//! snapshot shapes that the job-tracking collaborator hands to the
//! scheduling core.

pub mod config;
pub mod types;

pub use config::PoolsFile;
pub use types::*;

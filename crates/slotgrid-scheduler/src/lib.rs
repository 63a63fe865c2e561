//! slotgrid-scheduler — the fair-share scheduling core.
//!
//! Divides a cluster's fixed pool of map and reduce execution slots
//! among administrator-defined pools of jobs, using weighted fair
//! sharing plus a credit mechanism that smooths allocation over time
//! and protects starved pools.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── SchedulerState (one RwLock: the whole mutual-exclusion domain)
//!   │     └── PoolManager (slotgrid-pool)
//!   │           └── Pool → PoolSchedulable × {map, reduce}
//!   ├── on_tick: demand refresh → water-filling (slotgrid-alloc)
//!   │            → credit accrual → commit
//!   └── request_assignment: rank pools by credit, then deficit,
//!                           then name; pick a job inside the winner
//! ```
//!
//! The job-tracking authority owns job lifecycle and slot inventory;
//! this crate only reads its snapshots and answers "which job gets
//! the next free slot".

pub mod error;
pub mod report;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use report::{PoolReport, ScheduleReport};
pub use scheduler::{Assignment, Scheduler, SchedulerConfig, SnapshotFn, TickSnapshot};

//! slotgrid-pool — pool and schedulable bookkeeping.
//!
//! One [`Pool`] per administrator-defined pool name, each owning two
//! [`PoolSchedulable`]s (map and reduce) and its member-job snapshots.
//! The [`PoolManager`] owns the name → pool table, resolves job
//! membership, and applies the misconfiguration policy for inverted
//! min/max shares.
//!
//! Numeric state in these types is mutated only by the scheduler's
//! tick and by job add/remove events; reporting callers get read-only
//! views.

pub mod manager;
pub mod pool;
pub mod schedulable;

pub use manager::{DEFAULT_POOL, PoolManager};
pub use pool::{Pool, PoolMetrics, TypeMetrics};
pub use schedulable::PoolSchedulable;

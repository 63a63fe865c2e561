//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
///
/// "No assignment available" is never an error — it is the `None`
/// arm of [`crate::Scheduler::request_assignment`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job already tracked: {0}")]
    DuplicateJob(String),

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    #[error("pool removal refused: {0}")]
    PoolRemoval(#[from] slotgrid_pool::manager::RemovePoolError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

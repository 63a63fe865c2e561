//! Read-only pool snapshots for the administrative layer.
//!
//! Reports reflect only fully committed tick state: they are built
//! under the same lock the tick holds, so a half-finished allocation
//! pass can never leak out.

use serde::Serialize;

use slotgrid_core::{SchedulingMode, TaskType, TaskTypeMap};
use slotgrid_pool::Pool;

/// Per-task-type view of one pool's scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub fair_share: f64,
    pub demand: u32,
    /// Demand before the running-task roof; diagnostics only.
    pub demand_without_roof: u32,
    pub running: u32,
    pub credit: f64,
    pub weight: f64,
    pub min_share: u32,
    pub max_share: Option<u32>,
    /// True when min share > max share was configured; the effective
    /// min is capped to the max.
    pub share_inverted: bool,
    /// Mean slot-seconds consumed per finished job of this type.
    pub response_time: f64,
    /// Mean slot-seconds per MB of this type's IO.
    pub stretch: f64,
    /// Cumulative IO volume of finished jobs in MB.
    pub input_mb: f64,
}

/// Committed-state snapshot of one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolReport {
    pub name: String,
    pub mode: SchedulingMode,
    pub job_count: usize,
    pub schedulables: TaskTypeMap<ScheduleReport>,
    pub finished_jobs: u64,
    /// Mean job response time in seconds.
    pub response_time: f64,
    /// Mean response time per MB of job input.
    pub stretch: f64,
    /// Cumulative input of finished jobs in MB.
    pub input_mb: f64,
}

impl PoolReport {
    pub(crate) fn from_pool(pool: &Pool) -> Self {
        let schedulables = TaskTypeMap::from_fn(|ttype| {
            let sched = pool.schedulable(ttype);
            let typed = pool.metrics().per_type.get(ttype);
            ScheduleReport {
                fair_share: sched.fair_share(),
                demand: sched.demand(),
                demand_without_roof: sched.demand_without_roof(),
                running: sched.running(),
                credit: sched.credit(),
                weight: sched.weight(),
                min_share: *pool.config().min_share.get(ttype),
                max_share: *pool.config().max_share.get(ttype),
                share_inverted: pool.config().share_inverted(ttype),
                response_time: typed.response_time,
                stretch: typed.stretch,
                input_mb: typed.input_mb,
            }
        });
        let metrics = pool.metrics();
        Self {
            name: pool.name().to_string(),
            mode: pool.mode(),
            job_count: pool.job_count(),
            schedulables,
            finished_jobs: metrics.finished_jobs,
            response_time: metrics.response_time,
            stretch: metrics.stretch,
            input_mb: metrics.input_mb,
        }
    }

    pub fn schedulable(&self, ttype: TaskType) -> &ScheduleReport {
        self.schedulables.get(ttype)
    }
}

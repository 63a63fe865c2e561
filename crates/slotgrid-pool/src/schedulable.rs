//! Per-pool, per-task-type scheduling state.
//!
//! A `PoolSchedulable` tracks one task type for one pool: how many
//! slots the pool could use (demand), how many it holds (running),
//! the entitlement computed by the last allocation pass (fair share),
//! and the credit balance accrued while under-served.

use tracing::{debug, warn};

use slotgrid_core::{JobState, PoolConfig, TaskType};

/// Scheduling state for one (pool, task type) pair.
///
/// Invariant: `running ≤ demand` — demand counts running tasks plus
/// outstanding work, so a pool never "runs more than it desires".
#[derive(Debug, Clone)]
pub struct PoolSchedulable {
    task_type: TaskType,
    /// Slots the pool could use right now (running + outstanding),
    /// capped at the configured running-task roof.
    demand: u32,
    /// Demand ignoring the roof; reporting only, never fed to the
    /// allocation pass.
    demand_without_roof: u32,
    /// Tasks of this type currently running across member jobs.
    running: u32,
    /// Entitlement from the last committed allocation pass. Written
    /// only by the scheduler tick.
    fair_share: f64,
    /// Priority-adjusted weight from the last demand refresh.
    weight: f64,
    /// Accrued entitlement; never negative at rest.
    credit: f64,
}

impl PoolSchedulable {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            demand: 0,
            demand_without_roof: 0,
            running: 0,
            fair_share: 0.0,
            weight: 1.0,
            credit: 0.0,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn demand(&self) -> u32 {
        self.demand
    }

    pub fn demand_without_roof(&self) -> u32 {
        self.demand_without_roof
    }

    pub fn running(&self) -> u32 {
        self.running
    }

    /// Outstanding slots the pool could still accept.
    pub fn pending(&self) -> u32 {
        self.demand.saturating_sub(self.running)
    }

    pub fn fair_share(&self) -> f64 {
        self.fair_share
    }

    /// Entitlement not yet served: `fair_share − running`.
    pub fn deficit(&self) -> f64 {
        self.fair_share - f64::from(self.running)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn credit(&self) -> f64 {
        self.credit
    }

    /// Recompute demand, running count, and weight from the member
    /// jobs. Called once per tick before fair shares are computed.
    pub fn update_demand<'a>(
        &mut self,
        pool_name: &str,
        jobs: impl Iterator<Item = &'a JobState>,
        config: &PoolConfig,
    ) {
        let mut demand: u32 = 0;
        let mut running: u32 = 0;
        let mut factor_sum = 0.0;
        let mut job_count = 0u32;

        for job in jobs {
            let counts = job.tasks.get(self.task_type);
            running = running.saturating_add(counts.running);
            demand = demand
                .saturating_add(counts.running)
                .saturating_add(counts.outstanding());
            factor_sum += job.priority.factor();
            job_count += 1;
        }

        self.demand_without_roof = demand;
        if let Some(roof) = *config.max_running.get(self.task_type) {
            if running > roof {
                warn!(
                    pool = pool_name,
                    task_type = ?self.task_type,
                    running,
                    roof,
                    "pool runs more tasks than its configured roof"
                );
            }
            // The roof never pushes demand below the running count, or
            // the running ≤ demand invariant would break on reload.
            let capped = roof.max(running);
            if capped < demand {
                debug!(
                    pool = pool_name,
                    task_type = ?self.task_type,
                    demand,
                    capped,
                    "demand capped by running-task roof"
                );
                demand = capped;
            }
        }

        self.demand = demand;
        self.running = running;

        let base_weight = if config.weight > 0.0 {
            config.weight
        } else {
            warn!(
                pool = pool_name,
                weight = config.weight,
                "non-positive pool weight, substituting 1.0"
            );
            1.0
        };
        self.weight = if job_count == 0 {
            base_weight
        } else {
            base_weight * (factor_sum / f64::from(job_count))
        };
    }

    /// Set the entitlement computed by the allocation pass.
    pub fn set_fair_share(&mut self, share: f64) {
        self.fair_share = share.max(0.0);
    }

    /// Accrue credit for one tick of duration `dt` seconds.
    ///
    /// Only under-served schedulables accrue; an over-served pool
    /// never goes into debt below `floor`.
    pub fn accrue_credit(&mut self, dt: f64, floor: f64) {
        if self.fair_share > f64::from(self.running) {
            self.credit += (self.fair_share - f64::from(self.running)) * dt;
        }
        self.credit = self.credit.max(floor);
    }

    /// Spend credit when a task is assigned, clamped at `floor`.
    pub fn spend_credit(&mut self, cost: f64, floor: f64) {
        self.credit = (self.credit - cost).max(floor);
    }

    /// Account for a task assignment decided this instant: the task
    /// moves from outstanding to running, leaving demand unchanged.
    pub fn task_started(&mut self) {
        self.running = self.running.saturating_add(1).min(self.demand);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotgrid_core::{JobPriority, TaskCounts, TaskTypeMap};

    fn job(id: &str, priority: JobPriority, desired: u32, running: u32, finished: u32) -> JobState {
        JobState {
            id: id.to_string(),
            pool: None,
            priority,
            submitted_at: 0,
            tasks: TaskTypeMap {
                map: TaskCounts {
                    desired,
                    running,
                    finished,
                },
                reduce: TaskCounts::default(),
            },
            input_size_mb: 100.0,
            slot_seconds: TaskTypeMap::default(),
            io_mb: TaskTypeMap::default(),
        }
    }

    #[test]
    fn demand_counts_running_plus_outstanding() {
        let jobs = vec![
            job("a", JobPriority::Normal, 10, 2, 3),
            job("b", JobPriority::Normal, 4, 1, 0),
        ];
        let mut sched = PoolSchedulable::new(TaskType::Map);
        sched.update_demand("p", jobs.iter(), &PoolConfig::default());

        // a: 2 running + 5 outstanding; b: 1 running + 3 outstanding.
        assert_eq!(sched.demand(), 11);
        assert_eq!(sched.running(), 3);
        assert_eq!(sched.pending(), 8);
        assert!(sched.running() <= sched.demand());
    }

    #[test]
    fn empty_pool_has_zero_demand_and_base_weight() {
        let mut sched = PoolSchedulable::new(TaskType::Reduce);
        let config = PoolConfig {
            weight: 2.5,
            ..PoolConfig::default()
        };
        sched.update_demand("p", std::iter::empty::<&JobState>(), &config);
        assert_eq!(sched.demand(), 0);
        assert_eq!(sched.weight(), 2.5);
    }

    #[test]
    fn roof_caps_demand_but_not_below_running() {
        let jobs = vec![job("a", JobPriority::Normal, 100, 6, 0)];
        let config = PoolConfig {
            max_running: TaskTypeMap {
                map: Some(4),
                reduce: None,
            },
            ..PoolConfig::default()
        };
        let mut sched = PoolSchedulable::new(TaskType::Map);
        sched.update_demand("p", jobs.iter(), &config);

        // Roof is 4 but 6 tasks already run; demand stays ≥ running.
        assert_eq!(sched.demand(), 6);
        assert_eq!(sched.demand_without_roof(), 100);
        assert!(sched.running() <= sched.demand());
    }

    #[test]
    fn weight_scales_with_member_priorities() {
        let jobs = vec![
            job("a", JobPriority::VeryHigh, 10, 0, 0),
            job("b", JobPriority::Normal, 10, 0, 0),
        ];
        let config = PoolConfig {
            weight: 2.0,
            ..PoolConfig::default()
        };
        let mut sched = PoolSchedulable::new(TaskType::Map);
        sched.update_demand("p", jobs.iter(), &config);

        // 2.0 × mean(4.0, 1.0) = 5.0
        assert!((sched.weight() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn credit_accrues_only_when_under_served() {
        let mut sched = PoolSchedulable::new(TaskType::Map);
        let jobs = vec![job("a", JobPriority::Normal, 10, 2, 0)];
        sched.update_demand("p", jobs.iter(), &PoolConfig::default());

        sched.set_fair_share(5.0);
        sched.accrue_credit(0.5, 0.0);
        assert!((sched.credit() - 1.5).abs() < 1e-9);

        // Over-served: no accrual, no debt.
        sched.set_fair_share(1.0);
        sched.accrue_credit(0.5, 0.0);
        assert!((sched.credit() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn spent_credit_never_goes_below_floor() {
        let mut sched = PoolSchedulable::new(TaskType::Map);
        sched.set_fair_share(4.0);
        sched.accrue_credit(0.25, 0.0);
        assert!((sched.credit() - 1.0).abs() < 1e-9);

        sched.spend_credit(5.0, 0.0);
        assert_eq!(sched.credit(), 0.0);
    }

    #[test]
    fn nonzero_floor_bounds_both_accrual_and_spend() {
        let mut sched = PoolSchedulable::new(TaskType::Map);
        // Over-served: nothing accrues, but the balance is lifted to
        // the floor.
        sched.accrue_credit(1.0, 0.5);
        assert_eq!(sched.credit(), 0.5);

        sched.spend_credit(10.0, 0.5);
        assert_eq!(sched.credit(), 0.5);
    }

    #[test]
    fn task_started_moves_outstanding_to_running() {
        let jobs = vec![job("a", JobPriority::Normal, 3, 0, 0)];
        let mut sched = PoolSchedulable::new(TaskType::Map);
        sched.update_demand("p", jobs.iter(), &PoolConfig::default());

        sched.task_started();
        assert_eq!(sched.running(), 1);
        assert_eq!(sched.demand(), 3);
        assert_eq!(sched.pending(), 2);
    }
}

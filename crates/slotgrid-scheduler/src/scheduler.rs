//! Scheduler — the periodic allocation tick and the task-assignment
//! decision.
//!
//! One `Scheduler` owns all pool state behind a single lock. Each
//! tick refreshes demand from collaborator-supplied job snapshots,
//! recomputes fair shares per task type with the water-filling
//! allocator, and accrues credit for under-served pools. When the
//! job-tracking collaborator reports a free slot it calls
//! [`Scheduler::request_assignment`], which ranks pools by credit and
//! deficit and picks a job inside the winning pool.

use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use slotgrid_alloc::{ShareRequest, compute_fair_shares};
use slotgrid_core::{
    JobId, JobPriority, JobState, PoolConfig, PoolName, SchedulingMode, TaskType, TaskTypeMap,
};
use slotgrid_pool::{Pool, PoolManager};

use crate::error::{SchedulerError, SchedulerResult};
use crate::report::PoolReport;

/// Scheduler-wide tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between allocation ticks; calls arriving
    /// faster are skipped.
    pub tick_interval: Duration,
    /// Credit spent per assigned task.
    pub credit_task_cost: f64,
    /// Lower bound for credit balances.
    pub credit_floor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            credit_task_cost: 1.0,
            credit_floor: 0.0,
        }
    }
}

/// Consistent point-in-time view of the cluster, read by the caller
/// from the job-tracking authority before the tick. The scheduler
/// never blocks on the authority itself.
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    /// Collaborator clock in milliseconds; tick spacing and credit
    /// accrual both derive from deltas of this value.
    pub now_ms: u64,
    /// Total cluster slots per task type, constant within the tick.
    pub capacity: TaskTypeMap<u32>,
    /// Fresh per-job counters for tracked jobs. Jobs omitted here
    /// keep their previous counts; unknown ids are skipped.
    pub jobs: Vec<JobState>,
}

/// A positive assignment decision: which job in which pool gets the
/// freed slot. Picking the concrete task instance (locality,
/// speculation) stays with the job-tracking collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub pool: PoolName,
    pub job: JobId,
}

/// Callback type that reads a fresh [`TickSnapshot`] for the periodic
/// driver.
pub type SnapshotFn = Box<dyn Fn() -> BoxFuture + Send + Sync>;

type BoxFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<TickSnapshot>> + Send>>;

/// All mutable scheduler state, guarded as one mutual-exclusion
/// domain: a tick, an assignment, or an administrative mutation each
/// hold the write lock for their full (CPU-only) duration.
struct SchedulerState {
    manager: PoolManager,
    last_tick_ms: Option<u64>,
    last_capacity: TaskTypeMap<u32>,
    /// Set by membership/priority mutations; forces a re-allocation
    /// from the last committed snapshot before the next assignment.
    stale: bool,
}

/// The scheduling core.
pub struct Scheduler {
    config: SchedulerConfig,
    state: RwLock<SchedulerState>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SchedulerState {
                manager: PoolManager::new(),
                last_tick_ms: None,
                last_capacity: TaskTypeMap::default(),
                stale: false,
            }),
        }
    }

    // ── Membership events ─────────────────────────────────────────

    /// Track a newly submitted job in its requested pool (or the
    /// default pool). Returns the pool it joined.
    pub async fn on_job_added(&self, job: JobState) -> SchedulerResult<PoolName> {
        let mut state = self.state.write().await;
        let job_id = job.id.clone();
        let pool = state
            .manager
            .add_job(job)
            .ok_or(SchedulerError::DuplicateJob(job_id.clone()))?;
        state.stale = true;
        info!(job = %job_id, pool = %pool, "job added");
        Ok(pool)
    }

    /// Stop tracking a finished job and fold it into its pool's
    /// completion metrics. Returns the pool it left.
    pub async fn on_job_removed(
        &self,
        job_id: &str,
        finished_at: u64,
    ) -> SchedulerResult<PoolName> {
        let mut state = self.state.write().await;
        let pool = state
            .manager
            .remove_job(job_id, finished_at)
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.to_string()))?;
        state.stale = true;
        info!(job = job_id, pool = %pool, "job removed");
        Ok(pool)
    }

    // ── Administrative mutations ──────────────────────────────────

    /// Move a job to the named pool, creating the pool if needed.
    pub async fn set_pool(&self, job_id: &str, pool_name: &str) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        state
            .manager
            .set_pool(job_id, pool_name)
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.to_string()))?;
        state.stale = true;
        Ok(())
    }

    /// Change a job's priority, reweighting it in the next allocation.
    pub async fn set_priority(&self, job_id: &str, priority: JobPriority) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let pool_name = state
            .manager
            .pool_of_job(job_id)
            .map(str::to_string)
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.to_string()))?;
        if let Some(pool) = state.manager.pool_mut(&pool_name)
            && let Some(job) = pool.job_mut(job_id)
        {
            job.priority = priority;
        }
        state.stale = true;
        info!(job = job_id, ?priority, "job priority changed");
        Ok(())
    }

    /// Replace all pool configs (wholesale reload between ticks).
    pub async fn replace_configs(&self, configs: Vec<(PoolName, PoolConfig)>) {
        let mut state = self.state.write().await;
        state.manager.replace_configs(configs);
        state.stale = true;
    }

    /// Explicit administrative pool removal.
    pub async fn remove_pool(&self, name: &str) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        state.manager.remove_pool(name)?;
        Ok(())
    }

    // ── The allocation tick ───────────────────────────────────────

    /// Run one allocation pass: refresh job counts and demand,
    /// compute fair shares per task type, accrue credit, commit.
    ///
    /// Returns `Ok(false)` when the call arrived faster than the
    /// configured interval and was skipped. On a snapshot validation
    /// error nothing is mutated: the prior tick's fair shares and
    /// credits stay committed.
    pub async fn on_tick(&self, snapshot: TickSnapshot) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;

        let dt = match state.last_tick_ms {
            Some(last) => {
                if snapshot.now_ms < last {
                    return Err(SchedulerError::InconsistentSnapshot(format!(
                        "snapshot clock went backwards: {} < {}",
                        snapshot.now_ms, last
                    )));
                }
                let elapsed_ms = snapshot.now_ms - last;
                if Duration::from_millis(elapsed_ms) < self.config.tick_interval {
                    debug!(elapsed_ms, "tick skipped, interval not elapsed");
                    return Ok(false);
                }
                elapsed_ms as f64 / 1000.0
            }
            None => self.config.tick_interval.as_secs_f64(),
        };

        // Validate before touching anything: a failed tick must leave
        // prior-tick state fully in place.
        let mut seen = std::collections::HashSet::new();
        for job in &snapshot.jobs {
            if !seen.insert(job.id.as_str()) {
                return Err(SchedulerError::InconsistentSnapshot(format!(
                    "duplicate job id in snapshot: {}",
                    job.id
                )));
            }
        }

        // Merge fresh counters into the tracked membership.
        for job in snapshot.jobs {
            let Some(pool_name) = state.manager.pool_of_job(&job.id).map(str::to_string) else {
                warn!(job = %job.id, "snapshot row for untracked job, skipped");
                continue;
            };
            for ttype in TaskType::ALL {
                if job.tasks.get(ttype).is_inconsistent() {
                    warn!(
                        job = %job.id,
                        task_type = ?ttype,
                        "running + finished exceeds desired, outstanding clamped to 0"
                    );
                }
            }
            if let Some(pool) = state.manager.pool_mut(&pool_name)
                && let Some(stored) = pool.job_mut(&job.id)
            {
                stored.priority = job.priority;
                stored.tasks = job.tasks;
                stored.input_size_mb = job.input_size_mb;
                stored.slot_seconds = job.slot_seconds;
                stored.io_mb = job.io_mb;
            }
        }

        allocate(&mut state.manager, snapshot.capacity, dt, &self.config);

        state.last_tick_ms = Some(snapshot.now_ms);
        state.last_capacity = snapshot.capacity;
        state.stale = false;
        Ok(true)
    }

    // ── Task assignment ───────────────────────────────────────────

    /// Decide which job receives a newly freed slot of `task_type`.
    ///
    /// `None` means no pool currently qualifies — a normal outcome,
    /// not a fault.
    pub async fn request_assignment(&self, task_type: TaskType) -> Option<Assignment> {
        let mut state = self.state.write().await;

        // Membership or priority changed since the last tick:
        // re-allocate from the committed snapshot before deciding.
        if state.stale && state.last_tick_ms.is_some() {
            debug!("re-allocating before assignment after admin mutation");
            let capacity = state.last_capacity;
            allocate(&mut state.manager, capacity, 0.0, &self.config);
            state.stale = false;
        }

        // Rank pools still owed capacity: credit first, then raw
        // deficit, then name (alphabetical, default last — the order
        // `pools_ordered` already yields, kept by the stable sort).
        let mut candidates: Vec<(PoolName, f64, f64)> = state
            .manager
            .pools_ordered()
            .into_iter()
            .filter_map(|pool| {
                let sched = pool.schedulable(task_type);
                let eligible =
                    sched.pending() > 0 && (sched.deficit() > 0.0 || sched.credit() > 0.0);
                eligible.then(|| (pool.name().to_string(), sched.credit(), sched.deficit()))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.2.total_cmp(&a.2)));

        for (pool_name, _, _) in candidates {
            let Some(pool) = state.manager.pool(&pool_name) else {
                continue;
            };
            let picked = match pool.mode() {
                SchedulingMode::Fifo => pick_fifo_job(pool, task_type),
                SchedulingMode::Fair => pick_fair_job(pool, task_type),
            };
            let Some(job_id) = picked else { continue };

            if let Some(pool) = state.manager.pool_mut(&pool_name) {
                pool.schedulable_mut(task_type).task_started();
                pool.schedulable_mut(task_type)
                    .spend_credit(self.config.credit_task_cost, self.config.credit_floor);
                if let Some(job) = pool.job_mut(&job_id) {
                    job.tasks.get_mut(task_type).running += 1;
                }
            }
            debug!(pool = %pool_name, job = %job_id, ?task_type, "task assigned");
            return Some(Assignment {
                pool: pool_name,
                job: job_id,
            });
        }

        debug!(?task_type, "no assignment available");
        None
    }

    // ── Reporting ─────────────────────────────────────────────────

    /// Committed-state snapshot of one pool, or `None` for an unknown
    /// name. Idempotent between ticks.
    pub async fn describe_pool(&self, name: &str) -> Option<PoolReport> {
        let state = self.state.read().await;
        state.manager.pool(name).map(PoolReport::from_pool)
    }

    /// All pools, alphabetical with the default pool last.
    pub async fn describe_pools(&self) -> Vec<PoolReport> {
        let state = self.state.read().await;
        state
            .manager
            .pools_ordered()
            .into_iter()
            .map(PoolReport::from_pool)
            .collect()
    }

    // ── Periodic driver ───────────────────────────────────────────

    /// Run the allocation loop until shutdown: every `interval` read
    /// a snapshot via `snapshot_fn` and tick. A failed snapshot or
    /// tick is logged and skipped; the previous shares stay in place.
    pub async fn run(
        &self,
        interval: Duration,
        snapshot_fn: SnapshotFn,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_ms = interval.as_millis() as u64, "scheduler tick loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match snapshot_fn().await {
                        Ok(snapshot) => {
                            if let Err(e) = self.on_tick(snapshot).await {
                                warn!(error = %e, "tick failed, prior shares kept");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "snapshot read failed, tick skipped");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler tick loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Refresh demand and recompute fair shares (and, when `dt > 0`,
/// credits) for every pool, one task type at a time.
fn allocate(
    manager: &mut PoolManager,
    capacity: TaskTypeMap<u32>,
    dt: f64,
    config: &SchedulerConfig,
) {
    let names: Vec<PoolName> = manager
        .pool_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    for name in &names {
        if let Some(pool) = manager.pool_mut(name) {
            pool.update_demand();
        }
    }

    for ttype in TaskType::ALL {
        let inverted = manager.inverted_shares(ttype);
        if !inverted.is_empty() {
            warn!(
                task_type = ?ttype,
                pools = ?inverted,
                "min share exceeds max share, effective min capped to max"
            );
        }

        let requests: Vec<ShareRequest> = names
            .iter()
            .filter_map(|name| manager.pool(name))
            .map(|pool| {
                let sched = pool.schedulable(ttype);
                ShareRequest {
                    demand: sched.demand(),
                    min_share: pool.config().effective_min_share(ttype),
                    max_share: pool.config().effective_max_share(ttype),
                    weight: sched.weight(),
                }
            })
            .collect();

        let shares = compute_fair_shares(&requests, f64::from(*capacity.get(ttype)));

        for (name, share) in names.iter().zip(shares) {
            if let Some(pool) = manager.pool_mut(name) {
                let sched = pool.schedulable_mut(ttype);
                sched.set_fair_share(share);
                if dt > 0.0 {
                    sched.accrue_credit(dt, config.credit_floor);
                }
            }
        }
    }
}

/// FIFO mode: earliest-submitted member job with outstanding work.
fn pick_fifo_job(pool: &Pool, ttype: TaskType) -> Option<JobId> {
    pool.jobs()
        .filter(|job| job.tasks.get(ttype).outstanding() > 0)
        .min_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|job| job.id.clone())
}

/// Fair mode: water-fill the pool's entitlement across member jobs
/// (weight = priority factor) and pick the largest per-job deficit.
fn pick_fair_job(pool: &Pool, ttype: TaskType) -> Option<JobId> {
    let jobs: Vec<&JobState> = pool
        .jobs()
        .filter(|job| job.tasks.get(ttype).outstanding() > 0)
        .collect();

    let requests: Vec<ShareRequest> = jobs
        .iter()
        .map(|job| {
            let counts = job.tasks.get(ttype);
            let demand = counts.running + counts.outstanding();
            ShareRequest {
                demand,
                min_share: 0,
                max_share: demand,
                weight: job.priority.factor(),
            }
        })
        .collect();

    let shares = compute_fair_shares(&requests, pool.schedulable(ttype).fair_share());

    let mut best: Option<(&JobState, f64)> = None;
    for (job, share) in jobs.iter().zip(shares) {
        let deficit = share - f64::from(job.tasks.get(ttype).running);
        // Strict comparison keeps the id-ordered first job on ties.
        if best.as_ref().is_none_or(|(_, d)| deficit > *d) {
            best = Some((job, deficit));
        }
    }
    best.map(|(job, _)| job.id.clone())
}

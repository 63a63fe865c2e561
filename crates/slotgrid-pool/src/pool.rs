//! A schedulable pool of jobs.
//!
//! Owns the member-job snapshots, one schedulable per task type, and
//! the cumulative completion metrics updated when a member job
//! finishes. Metrics are reporting-only and never feed allocation.

use std::collections::BTreeMap;

use tracing::warn;

use slotgrid_core::{JobId, JobState, PoolConfig, SchedulingMode, TaskType, TaskTypeMap};

use crate::schedulable::PoolSchedulable;

/// Completion counters for one task type of one pool.
#[derive(Debug, Clone, Default)]
pub struct TypeMetrics {
    /// Mean slot-seconds consumed per finished job.
    pub response_time: f64,
    /// Mean slowdown: slot-seconds normalized by the type's IO in MB.
    pub stretch: f64,
    /// Cumulative IO volume of finished jobs in MB.
    pub input_mb: f64,
    stretch_samples: u64,
}

/// Cumulative performance counters for one pool.
///
/// Running means use the incremental update
/// `avg_n = (avg_{n−1}·(n−1) + x_n)/n`. Stretch keeps its own sample
/// count because completions with no reported input size are skipped
/// rather than divided by zero; the same holds per task type, where a
/// zero IO volume is routine (a map-only job has no reduce IO).
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub finished_jobs: u64,
    /// Mean job response time in seconds.
    pub response_time: f64,
    /// Mean slowdown: response time normalized by input size in MB.
    pub stretch: f64,
    /// Cumulative input of finished jobs in MB.
    pub input_mb: f64,
    /// Per-task-type means fed from the job's slot-time counters.
    pub per_type: TaskTypeMap<TypeMetrics>,
    stretch_samples: u64,
}

fn mean_step(avg: f64, n: f64, sample: f64) -> f64 {
    (avg * (n - 1.0) + sample) / n
}

impl PoolMetrics {
    fn record(&mut self, pool: &str, response_secs: f64, job: &JobState) {
        self.finished_jobs += 1;
        let n = self.finished_jobs as f64;
        self.response_time = mean_step(self.response_time, n, response_secs);
        self.input_mb += job.input_size_mb;

        if job.input_size_mb > 0.0 {
            self.stretch_samples += 1;
            let m = self.stretch_samples as f64;
            self.stretch = mean_step(self.stretch, m, response_secs / job.input_size_mb);
        } else {
            warn!(
                pool,
                input_size_mb = job.input_size_mb,
                "job finished with no input size, stretch sample skipped"
            );
        }

        for ttype in TaskType::ALL {
            let slot_secs = *job.slot_seconds.get(ttype);
            let io_mb = *job.io_mb.get(ttype);
            let typed = self.per_type.get_mut(ttype);
            typed.response_time = mean_step(typed.response_time, n, slot_secs);
            typed.input_mb += io_mb;
            if io_mb > 0.0 {
                typed.stretch_samples += 1;
                let m = typed.stretch_samples as f64;
                typed.stretch = mean_step(typed.stretch, m, slot_secs / io_mb);
            }
        }
    }
}

/// A named group of jobs sharing a scheduling entitlement.
#[derive(Debug, Clone)]
pub struct Pool {
    name: String,
    config: PoolConfig,
    /// Member-job snapshots, keyed by job id. BTreeMap so every
    /// per-tick iteration is deterministic.
    jobs: BTreeMap<JobId, JobState>,
    schedulables: TaskTypeMap<PoolSchedulable>,
    metrics: PoolMetrics,
}

impl Pool {
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            jobs: BTreeMap::new(),
            schedulables: TaskTypeMap::from_fn(PoolSchedulable::new),
            metrics: PoolMetrics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Replace the pool's config (wholesale reload between ticks).
    pub fn set_config(&mut self, config: PoolConfig) {
        self.config = config;
    }

    pub fn mode(&self) -> SchedulingMode {
        self.config.mode
    }

    pub fn schedulable(&self, ttype: TaskType) -> &PoolSchedulable {
        self.schedulables.get(ttype)
    }

    pub fn schedulable_mut(&mut self, ttype: TaskType) -> &mut PoolSchedulable {
        self.schedulables.get_mut(ttype)
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    // ── Membership ────────────────────────────────────────────────

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn job(&self, id: &str) -> Option<&JobState> {
        self.jobs.get(id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut JobState> {
        self.jobs.get_mut(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobState> {
        self.jobs.values()
    }

    /// Add a member job. Returns false if the job was already present.
    pub fn add_job(&mut self, job: JobState) -> bool {
        self.jobs.insert(job.id.clone(), job).is_none()
    }

    /// Remove a member job without recording completion metrics
    /// (used when a job moves to another pool).
    pub fn take_job(&mut self, id: &str) -> Option<JobState> {
        self.jobs.remove(id)
    }

    /// Remove a finished member job and fold it into the pool's
    /// completion metrics.
    pub fn remove_job(&mut self, id: &str, finished_at: u64) -> Option<JobState> {
        let job = self.jobs.remove(id)?;
        let response_secs = finished_at.saturating_sub(job.submitted_at) as f64;
        self.metrics.record(&self.name, response_secs, &job);
        Some(job)
    }

    // ── Per-tick refresh ──────────────────────────────────────────

    /// Recompute demand, running counts, and weights for both task
    /// types from the current member snapshots.
    pub fn update_demand(&mut self) {
        for ttype in TaskType::ALL {
            let mut sched = self.schedulables.get(ttype).clone();
            sched.update_demand(&self.name, self.jobs.values(), &self.config);
            *self.schedulables.get_mut(ttype) = sched;
        }
    }
}

//! Domain types for the SlotGrid scheduling core.
//!
//! These types describe what the scheduler reads from its
//! collaborators: per-job task counts, priorities, and administrator
//! pool configuration. The scheduler never owns job lifecycle — it
//! sees jobs only as the snapshots defined here.

use serde::{Deserialize, Serialize};

/// Unique identifier for a job (owned by the job-tracking authority).
pub type JobId = String;

/// Name of a pool (unique key in the pool table).
pub type PoolName = String;

// ── Task type ─────────────────────────────────────────────────────

/// The two slot kinds the cluster schedules independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Map,
    Reduce,
}

impl TaskType {
    /// Both task types, for iterating the per-type tables.
    pub const ALL: [TaskType; 2] = [TaskType::Map, TaskType::Reduce];
}

/// A pair of values indexed by [`TaskType`].
///
/// Keeps map/reduce state in parallel tables so the allocation and
/// credit logic is parameterized over the type instead of duplicated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeMap<T> {
    pub map: T,
    pub reduce: T,
}

impl<T> TaskTypeMap<T> {
    pub fn get(&self, ttype: TaskType) -> &T {
        match ttype {
            TaskType::Map => &self.map,
            TaskType::Reduce => &self.reduce,
        }
    }

    pub fn get_mut(&mut self, ttype: TaskType) -> &mut T {
        match ttype {
            TaskType::Map => &mut self.map,
            TaskType::Reduce => &mut self.reduce,
        }
    }

    /// Build a map by evaluating `f` once per task type.
    pub fn from_fn(mut f: impl FnMut(TaskType) -> T) -> Self {
        Self {
            map: f(TaskType::Map),
            reduce: f(TaskType::Reduce),
        }
    }
}

// ── Priority and scheduling mode ──────────────────────────────────

/// Job priority as reported by the job-tracking authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    VeryLow,
    Low,
    Normal,
    High,
    VeryHigh,
}

impl JobPriority {
    /// Positive weight multiplier, monotone in priority.
    pub fn factor(self) -> f64 {
        match self {
            JobPriority::VeryLow => 0.25,
            JobPriority::Low => 0.5,
            JobPriority::Normal => 1.0,
            JobPriority::High => 2.0,
            JobPriority::VeryHigh => 4.0,
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

/// How jobs inside a single pool are ordered when the pool wins a slot.
///
/// Affects intra-pool job selection only, never inter-pool ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    Fair,
    Fifo,
}

impl Default for SchedulingMode {
    fn default() -> Self {
        SchedulingMode::Fair
    }
}

// ── Job snapshots ─────────────────────────────────────────────────

/// Per-task-type task counters for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    /// Total tasks the job wants to run.
    pub desired: u32,
    /// Tasks currently executing on workers.
    pub running: u32,
    /// Tasks already completed.
    pub finished: u32,
}

impl TaskCounts {
    /// Tasks the job could launch right now.
    ///
    /// Saturating: a collaborator reporting `running + finished >
    /// desired` yields 0 rather than wrapping.
    pub fn outstanding(&self) -> u32 {
        self.desired.saturating_sub(self.running + self.finished)
    }

    /// True when the reported counters cannot all be right.
    pub fn is_inconsistent(&self) -> bool {
        self.running + self.finished > self.desired
    }
}

/// Snapshot of one job as read from the job-tracking authority.
///
/// The scheduler stores the latest snapshot per member job and
/// refreshes it every tick; it never mutates the authority's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub id: JobId,
    /// Pool requested by the job's submitter; `None` means the
    /// default pool.
    pub pool: Option<PoolName>,
    pub priority: JobPriority,
    /// Unix timestamp (seconds) of job submission, FIFO ordering key.
    pub submitted_at: u64,
    /// Task counters per task type.
    pub tasks: TaskTypeMap<TaskCounts>,
    /// Job input size in MB, used only for the stretch metric.
    pub input_size_mb: f64,
    /// Cumulative slot-seconds consumed per task type, as counted by
    /// the job-tracking authority. Feeds the per-type completion
    /// metrics only, never allocation.
    #[serde(default)]
    pub slot_seconds: TaskTypeMap<f64>,
    /// Per-task-type IO volume in MB (map-side bytes read,
    /// reduce-side bytes written), for the per-type stretch metric.
    #[serde(default)]
    pub io_mb: TaskTypeMap<f64>,
}

// ── Pool configuration ────────────────────────────────────────────

/// Administrator-supplied parameters for one pool.
///
/// Immutable within a tick; replaced wholesale on config reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Guaranteed slot floor per task type.
    pub min_share: TaskTypeMap<u32>,
    /// Slot ceiling per task type; `None` means unbounded.
    pub max_share: TaskTypeMap<Option<u32>>,
    /// Ceiling on demand (the running-task roof); `None` means none.
    pub max_running: TaskTypeMap<Option<u32>>,
    /// Relative weight in proportional allocation, must be > 0.
    pub weight: f64,
    /// Intra-pool job ordering.
    pub mode: SchedulingMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_share: TaskTypeMap::default(),
            max_share: TaskTypeMap::default(),
            max_running: TaskTypeMap::default(),
            weight: 1.0,
            mode: SchedulingMode::Fair,
        }
    }
}

impl PoolConfig {
    /// Max share with the unbounded case folded in.
    pub fn effective_max_share(&self, ttype: TaskType) -> u32 {
        self.max_share.get(ttype).unwrap_or(u32::MAX)
    }

    /// Min share after the inverted-share correction: when the
    /// configured min exceeds the max, the min is capped down to the
    /// max rather than producing an infeasible constraint.
    pub fn effective_min_share(&self, ttype: TaskType) -> u32 {
        (*self.min_share.get(ttype)).min(self.effective_max_share(ttype))
    }

    /// True when min > max for this task type (misconfiguration,
    /// recovered by [`Self::effective_min_share`]).
    pub fn share_inverted(&self, ttype: TaskType) -> bool {
        *self.min_share.get(ttype) > self.effective_max_share(ttype)
    }
}

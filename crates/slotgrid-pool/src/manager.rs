//! The pool table.
//!
//! Maps pool names to [`Pool`]s, resolves which pool a job belongs
//! to, and applies the recovery policy for inverted min/max shares.
//! Pools are created lazily on first reference and destroyed only by
//! explicit administrative removal — never by becoming empty.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{info, warn};

use slotgrid_core::{JobId, JobState, PoolConfig, PoolName, TaskType};

use crate::pool::Pool;

/// Name of the default pool, where jobs with no pool parameter go.
pub const DEFAULT_POOL: &str = "default";

/// Why an administrative pool removal was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemovePoolError {
    #[error("the default pool cannot be removed")]
    DefaultPool,
    #[error("pool {0} still has {1} member jobs")]
    NotEmpty(String, usize),
    #[error("unknown pool: {0}")]
    Unknown(String),
}

/// Owns the name → pool mapping and the job → pool index.
#[derive(Debug)]
pub struct PoolManager {
    /// BTreeMap keeps enumeration deterministic.
    pools: BTreeMap<PoolName, Pool>,
    /// Which pool each known job currently belongs to.
    job_index: HashMap<JobId, PoolName>,
    /// Administrator-supplied configs, applied on pool creation and
    /// on wholesale reload.
    configs: HashMap<PoolName, PoolConfig>,
}

impl PoolManager {
    pub fn new() -> Self {
        let mut manager = Self {
            pools: BTreeMap::new(),
            job_index: HashMap::new(),
            configs: HashMap::new(),
        };
        manager.ensure_pool(DEFAULT_POOL);
        manager
    }

    // ── Configuration ─────────────────────────────────────────────

    /// Replace all pool configs. Existing pools pick up their new
    /// config immediately; pools not named fall back to the default.
    pub fn replace_configs(&mut self, configs: Vec<(PoolName, PoolConfig)>) {
        self.configs = configs.into_iter().collect();
        for (name, pool) in &mut self.pools {
            pool.set_config(self.configs.get(name).cloned().unwrap_or_default());
        }
    }

    /// Pools whose configured min share exceeds their max share for
    /// the given task type. The effective min is silently capped to
    /// the max; this only surfaces the misconfiguration to operators.
    pub fn inverted_shares(&self, ttype: TaskType) -> Vec<&str> {
        self.pools
            .values()
            .filter(|pool| pool.config().share_inverted(ttype))
            .map(Pool::name)
            .collect()
    }

    // ── Pool lookup and enumeration ───────────────────────────────

    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    pub fn pool_mut(&mut self, name: &str) -> Option<&mut Pool> {
        self.pools.get_mut(name)
    }

    /// Get or lazily create the named pool.
    pub fn ensure_pool(&mut self, name: &str) -> &mut Pool {
        let configs = &self.configs;
        self.pools.entry(name.to_string()).or_insert_with(|| {
            let config = configs.get(name).cloned().unwrap_or_else(|| {
                if name != DEFAULT_POOL {
                    info!(pool = name, "creating pool with default config");
                }
                PoolConfig::default()
            });
            Pool::new(name, config)
        })
    }

    /// Pool names in alphabetical order, default pool last.
    pub fn pool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .pools
            .keys()
            .map(String::as_str)
            .filter(|name| *name != DEFAULT_POOL)
            .collect();
        names.push(DEFAULT_POOL);
        names
    }

    /// Pools in [`Self::pool_names`] order.
    pub fn pools_ordered(&self) -> Vec<&Pool> {
        self.pool_names()
            .into_iter()
            .filter_map(|name| self.pools.get(name))
            .collect()
    }

    // ── Job membership ────────────────────────────────────────────

    pub fn pool_of_job(&self, job_id: &str) -> Option<&str> {
        self.job_index.get(job_id).map(String::as_str)
    }

    /// Add a job to its requested pool (or the default pool), lazily
    /// creating the pool. Returns the pool name, or `None` if the job
    /// is already a member somewhere.
    pub fn add_job(&mut self, job: JobState) -> Option<PoolName> {
        if self.job_index.contains_key(&job.id) {
            return None;
        }
        let pool_name = job.pool.clone().unwrap_or_else(|| DEFAULT_POOL.to_string());
        let job_id = job.id.clone();
        self.ensure_pool(&pool_name).add_job(job);
        self.job_index.insert(job_id, pool_name.clone());
        Some(pool_name)
    }

    /// Remove a finished job, folding it into its pool's completion
    /// metrics. Returns the pool it left.
    pub fn remove_job(&mut self, job_id: &str, finished_at: u64) -> Option<PoolName> {
        let pool_name = self.job_index.remove(job_id)?;
        if let Some(pool) = self.pools.get_mut(&pool_name) {
            pool.remove_job(job_id, finished_at);
        }
        Some(pool_name)
    }

    /// Move a job to the named pool, creating it if needed. Returns
    /// the previous pool name, or `None` for an unknown job. A move
    /// to the current pool is a no-op.
    pub fn set_pool(&mut self, job_id: &str, pool_name: &str) -> Option<PoolName> {
        let old_name = self.job_index.get(job_id)?.clone();
        if old_name == pool_name {
            return Some(old_name);
        }
        let job = self.pools.get_mut(&old_name)?.take_job(job_id)?;
        self.ensure_pool(pool_name).add_job(job);
        self.job_index
            .insert(job_id.to_string(), pool_name.to_string());
        info!(job = job_id, from = %old_name, to = pool_name, "job moved between pools");
        Some(old_name)
    }

    /// Explicit administrative pool removal. Refuses the default pool
    /// and pools that still have member jobs.
    pub fn remove_pool(&mut self, name: &str) -> Result<(), RemovePoolError> {
        if name == DEFAULT_POOL {
            return Err(RemovePoolError::DefaultPool);
        }
        let pool = self
            .pools
            .get(name)
            .ok_or_else(|| RemovePoolError::Unknown(name.to_string()))?;
        if !pool.is_empty() {
            return Err(RemovePoolError::NotEmpty(name.to_string(), pool.job_count()));
        }
        self.pools.remove(name);
        warn!(pool = name, "pool removed by administrator");
        Ok(())
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotgrid_core::{JobPriority, TaskCounts, TaskTypeMap};

    fn job(id: &str, pool: Option<&str>) -> JobState {
        JobState {
            id: id.to_string(),
            pool: pool.map(str::to_string),
            priority: JobPriority::Normal,
            submitted_at: 0,
            tasks: TaskTypeMap {
                map: TaskCounts {
                    desired: 4,
                    running: 0,
                    finished: 0,
                },
                reduce: TaskCounts::default(),
            },
            input_size_mb: 10.0,
            slot_seconds: TaskTypeMap::default(),
            io_mb: TaskTypeMap::default(),
        }
    }

    #[test]
    fn jobs_without_pool_land_in_default() {
        let mut manager = PoolManager::new();
        assert_eq!(manager.add_job(job("j1", None)).unwrap(), DEFAULT_POOL);
        assert_eq!(manager.pool_of_job("j1"), Some(DEFAULT_POOL));
    }

    #[test]
    fn unknown_pool_is_created_lazily() {
        let mut manager = PoolManager::new();
        assert!(manager.pool("etl").is_none());
        manager.add_job(job("j1", Some("etl"))).unwrap();

        let pool = manager.pool("etl").unwrap();
        assert_eq!(pool.config(), &PoolConfig::default());
        assert_eq!(pool.job_count(), 1);
    }

    #[test]
    fn duplicate_job_is_rejected() {
        let mut manager = PoolManager::new();
        assert!(manager.add_job(job("j1", None)).is_some());
        assert!(manager.add_job(job("j1", Some("etl"))).is_none());
    }

    #[test]
    fn pool_names_are_alphabetical_with_default_last() {
        let mut manager = PoolManager::new();
        manager.add_job(job("j1", Some("zeta"))).unwrap();
        manager.add_job(job("j2", Some("alpha"))).unwrap();
        manager.add_job(job("j3", None)).unwrap();

        assert_eq!(manager.pool_names(), vec!["alpha", "zeta", DEFAULT_POOL]);
    }

    #[test]
    fn set_pool_moves_membership_atomically() {
        let mut manager = PoolManager::new();
        manager.add_job(job("j1", Some("etl"))).unwrap();

        let old = manager.set_pool("j1", "adhoc").unwrap();
        assert_eq!(old, "etl");
        assert_eq!(manager.pool_of_job("j1"), Some("adhoc"));
        assert!(manager.pool("etl").unwrap().is_empty());
        assert_eq!(manager.pool("adhoc").unwrap().job_count(), 1);

        // Moving without a change is a no-op.
        assert_eq!(manager.set_pool("j1", "adhoc").unwrap(), "adhoc");
        assert!(manager.set_pool("ghost", "adhoc").is_none());
    }

    #[test]
    fn empty_pools_persist_until_removed() {
        let mut manager = PoolManager::new();
        manager.add_job(job("j1", Some("etl"))).unwrap();
        manager.remove_job("j1", 100).unwrap();

        // Still present while empty.
        assert!(manager.pool("etl").is_some());
        assert_eq!(manager.pool("etl").unwrap().metrics().finished_jobs, 1);

        manager.remove_pool("etl").unwrap();
        assert!(manager.pool("etl").is_none());
    }

    #[test]
    fn remove_pool_refusals() {
        let mut manager = PoolManager::new();
        manager.add_job(job("j1", Some("etl"))).unwrap();

        assert_eq!(
            manager.remove_pool(DEFAULT_POOL),
            Err(RemovePoolError::DefaultPool)
        );
        assert_eq!(
            manager.remove_pool("etl"),
            Err(RemovePoolError::NotEmpty("etl".to_string(), 1))
        );
        assert_eq!(
            manager.remove_pool("ghost"),
            Err(RemovePoolError::Unknown("ghost".to_string()))
        );
    }

    #[test]
    fn replace_configs_applies_to_existing_pools() {
        let mut manager = PoolManager::new();
        manager.add_job(job("j1", Some("etl"))).unwrap();

        let config = PoolConfig {
            weight: 3.0,
            ..PoolConfig::default()
        };
        manager.replace_configs(vec![("etl".to_string(), config.clone())]);
        assert_eq!(manager.pool("etl").unwrap().config(), &config);

        // Reload that drops the entry resets the pool to defaults.
        manager.replace_configs(vec![]);
        assert_eq!(manager.pool("etl").unwrap().config(), &PoolConfig::default());
    }

    #[test]
    fn inverted_shares_are_reported_per_task_type() {
        let mut manager = PoolManager::new();
        let config = PoolConfig {
            min_share: TaskTypeMap { map: 8, reduce: 0 },
            max_share: TaskTypeMap {
                map: Some(2),
                reduce: Some(4),
            },
            ..PoolConfig::default()
        };
        manager.replace_configs(vec![("etl".to_string(), config)]);
        manager.add_job(job("j1", Some("etl"))).unwrap();

        assert_eq!(manager.inverted_shares(TaskType::Map), vec!["etl"]);
        assert!(manager.inverted_shares(TaskType::Reduce).is_empty());
    }
}

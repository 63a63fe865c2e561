//! pools.toml configuration parser.
//!
//! Loading pool definitions is the job of an external collaborator;
//! this module only defines the on-disk shape and turns it into
//! in-memory [`PoolConfig`] values. The scheduling core never reads
//! files itself.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{PoolConfig, PoolName, SchedulingMode, TaskTypeMap};

/// Root of a pools.toml document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolsFile {
    /// Scheduling mode applied to pools that don't set their own.
    pub default_mode: Option<SchedulingMode>,
    #[serde(default, rename = "pool")]
    pub pools: Vec<PoolEntry>,
}

/// One `[[pool]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub name: String,
    pub min_maps: Option<u32>,
    pub min_reduces: Option<u32>,
    pub max_maps: Option<u32>,
    pub max_reduces: Option<u32>,
    pub max_running_maps: Option<u32>,
    pub max_running_reduces: Option<u32>,
    pub weight: Option<f64>,
    pub mode: Option<SchedulingMode>,
}

impl PoolsFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the document into named pool configs.
    pub fn into_configs(self) -> Vec<(PoolName, PoolConfig)> {
        let default_mode = self.default_mode.unwrap_or_default();
        self.pools
            .into_iter()
            .map(|entry| {
                let config = PoolConfig {
                    min_share: TaskTypeMap {
                        map: entry.min_maps.unwrap_or(0),
                        reduce: entry.min_reduces.unwrap_or(0),
                    },
                    max_share: TaskTypeMap {
                        map: entry.max_maps,
                        reduce: entry.max_reduces,
                    },
                    max_running: TaskTypeMap {
                        map: entry.max_running_maps,
                        reduce: entry.max_running_reduces,
                    },
                    weight: entry.weight.unwrap_or(1.0),
                    mode: entry.mode.unwrap_or(default_mode),
                };
                (entry.name, config)
            })
            .collect()
    }
}

//! Engine configuration, loaded from YAML
use super::budget::DEFAULT_LOW_THRESHOLD_PERCENT;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("municipal-approval.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialStatus {
    /// Stay in DRAFT after the code is assigned; submit separately.
    Draft,
    /// Go straight to PENDING_L1 once the code is assigned.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_initial_status")]
    pub initial_status: InitialStatus,
    #[serde(default = "default_max_stale_retries")]
    pub max_stale_retries: u32,
}

fn default_initial_status() -> InitialStatus {
    InitialStatus::Pending
}

fn default_max_stale_retries() -> u32 {
    3
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            initial_status: default_initial_status(),
            max_stale_retries: default_max_stale_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_low_threshold")]
    pub low_threshold_percent: u8,
}

fn default_low_threshold() -> u8 {
    DEFAULT_LOW_THRESHOLD_PERCENT
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            low_threshold_percent: default_low_threshold(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Falls back to defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.budget.low_threshold_percent <= 100,
            "budget.low_threshold_percent must be at most 100, got {}",
            self.budget.low_threshold_percent
        );
        anyhow::ensure!(
            self.approval.max_stale_retries >= 1,
            "approval.max_stale_retries must be at least 1"
        );
        Ok(())
    }
}

//! Configuration module for the sensor pipeline
//!
//! [`PipelineConfig`] selects the execution mode, the optional stages, queue
//! sizing and shutdown polling. It is fixed at construction: the orchestrator
//! copies it and never consults process-wide state afterwards.
//!
//! # Files
//!
//! Configs can be stored as TOML (`.toml`) or JSON (anything else). Missing
//! fields fall back to their defaults.
//!
//! # Example
//!
//! ```ignore
//! use sensor_pipeline::config::{ExecutionMode, PipelineConfig};
//!
//! let mut config = PipelineConfig::load_or_default("pipeline.toml");
//! config.execution = ExecutionMode::Sequential;
//! config.deterministic = true;
//! config.save("pipeline.toml")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{PipelineError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Seed used when `deterministic` is set
pub const DETERMINISTIC_SEED: u64 = 0;

/// Complete orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parallel or sequential scheduling
    pub execution: ExecutionMode,
    /// Optional stages
    pub stages: StageToggles,
    /// Queue sizing and backpressure
    pub queues: QueueConfig,
    /// Quiescence polling
    pub shutdown: ShutdownConfig,
    /// Seed every RNG handed out by [`PipelineConfig::rng`] with a fixed value
    pub deterministic: bool,
}

impl PipelineConfig {
    /// Sequential configuration with only the mandatory chain
    pub fn sequential() -> Self {
        Self {
            execution: ExecutionMode::Sequential,
            ..Self::default()
        }
    }

    /// Parallel configuration with only the mandatory chain
    pub fn parallel() -> Self {
        Self::default()
    }

    /// Enable every optional stage
    pub fn with_all_stages(mut self) -> Self {
        self.stages = StageToggles {
            map: true,
            revisit: true,
            visualize: true,
        };
        self
    }

    /// Check invariants that would otherwise surface as hangs at runtime
    pub fn validate(&self) -> Result<()> {
        if self.queues.capacity == 0 {
            return Err(PipelineError::Config(
                "queues.capacity must be at least 1".to_string(),
            ));
        }
        if self.queues.push_timeout_ms == 0 {
            return Err(PipelineError::Config(
                "queues.push_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.shutdown.poll_interval_ms == 0 {
            return Err(PipelineError::Config(
                "shutdown.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// RNG for stages and data sources, seeded per `deterministic`
    pub fn rng(&self) -> fastrand::Rng {
        if self.deterministic {
            fastrand::Rng::with_seed(DETERMINISTIC_SEED)
        } else {
            fastrand::Rng::new()
        }
    }

    /// Load a config file (TOML for `.toml`, JSON otherwise)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file {:?}", path))?;
        Ok(config)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load pipeline config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config (TOML for `.toml`, JSON otherwise)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(PipelineError::from)
                    .context("Failed to create config directory")?;
            }
        }

        let content = if is_toml(path) {
            self.to_toml_string()?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| PipelineError::Serialization(e.to_string()))?
        };

        std::fs::write(path, content).map_err(|e| {
            PipelineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Serialization(e.to_string()))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

//! ---
//! mb_section: "01-core-functionality"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Shared primitives and utilities for the bench runtime."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_buffer_capacity() -> usize {
    5000
}

fn default_script_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_step_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_attempts() -> u32 {
    60
}

fn default_replay_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the M-BENCH runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Message buffer sizing.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Script host defaults.
    #[serde(default)]
    pub script: ScriptConfig,
    /// Test case step engine defaults.
    #[serde(default)]
    pub testcase: TestCaseConfig,
    /// Replay scheduler defaults.
    #[serde(default)]
    pub replay: ReplayConfig,
    /// Logging sink configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Message buffer sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum number of messages retained per subscription pattern.
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
}

/// Script host defaults.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Liveness timeout applied to a run unless the caller overrides it.
    #[serde(default = "default_script_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub default_timeout: Duration,
}

/// Test case step engine defaults.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseConfig {
    /// Pause between re-invocations of a step that returned `InProgress`.
    #[serde(default = "default_step_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub step_interval: Duration,
    /// Maximum number of invocations of a single step before it is failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Replay scheduler defaults.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Suggested sleep between readiness polls for replay loops.
    #[serde(default = "default_replay_poll_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
}

/// Logging sink configuration consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving the rolling daily log files.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Optional file prefix; defaults to the service name.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Stdout log format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_script_timeout(),
        }
    }
}

impl Default for TestCaseConfig {
    fn default() -> Self {
        Self {
            step_interval: default_step_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_replay_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

impl EngineConfig {
    /// Environment variable overriding the configuration file path.
    pub const ENV_CONFIG_PATH: &str = "M_BENCH_CONFIG";

    /// Load configuration from disk, respecting the `M_BENCH_CONFIG` override.
    ///
    /// Candidates are inspected in order and the first existing file wins.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<EngineConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            return Err(anyhow!("buffer capacity must be greater than zero"));
        }
        if self.script.default_timeout.is_zero() {
            return Err(anyhow!("script default timeout must be greater than zero"));
        }
        if self.testcase.max_attempts == 0 {
            return Err(anyhow!("test case max attempts must be greater than zero"));
        }
        if self.replay.poll_interval.is_zero() {
            return Err(anyhow!("replay poll interval must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.buffer.capacity, 5000);
        assert_eq!(config.testcase.step_interval, Duration::from_millis(1000));
    }

    #[test]
    fn loads_partial_toml_with_millisecond_durations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[buffer]\ncapacity = 10\n\n[script]\ndefault_timeout = 2000\n"
        )
        .unwrap();

        let config = EngineConfig::load(&[&path]).unwrap();
        assert_eq!(config.buffer.capacity, 10);
        assert_eq!(config.script.default_timeout, Duration::from_secs(2));
        // Unspecified sections keep their defaults.
        assert_eq!(config.testcase.max_attempts, 60);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = EngineConfig {
            buffer: BufferConfig { capacity: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

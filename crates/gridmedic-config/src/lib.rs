//! gridmedic-config — run configuration for GridMedic.
//!
//! Every tunable the health manager recognizes lives here: node inventory,
//! NCCL bandwidth thresholds, the reboot bound, concurrency cap, timeouts,
//! and the GHR/Teams integration settings. Values come from environment
//! variables with the documented defaults; components receive an explicit
//! `Config` (or a sub-struct of it) and never read ambient state themselves.
//!
//! Invalid values are fatal at startup — a run with a garbage threshold or
//! a zero concurrency cap must not start.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Parse { name: &'static str, value: String },

    #[error("invalid configuration: {name}: {detail}")]
    Invalid { name: &'static str, detail: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// GHR (Global Health Reporting) submission settings.
#[derive(Debug, Clone)]
pub struct GhrConfig {
    /// Submission endpoint.
    pub endpoint: String,
    /// Skip submission if one succeeded within this many hours.
    pub skip_hours: u32,
    /// Maximum number of failed nodes per submission.
    pub max_nodes: usize,
    /// Submission attempts before giving up.
    pub max_retries: u32,
    /// Delay between submission attempts.
    pub retry_interval: Duration,
    /// Impact category attached to the payload.
    pub impact_category: String,
    /// Free-form impact description.
    pub impact_description: String,
}

/// Complete run configuration for the health manager.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname prefix for the cluster inventory (`{prefix}-{i}`).
    pub node_prefix: String,
    /// Number of nodes in the cluster inventory.
    pub node_count: u32,
    /// Single-node NCCL bandwidth threshold in MB/s.
    pub nccl_bw_threshold: f64,
    /// Multi-node NCCL bandwidth threshold in MB/s.
    pub nccl_multi_bw_threshold: f64,
    /// Maximum automated reboot attempts per node before quarantine.
    pub max_reboot_count: u32,
    /// Whether failed nodes are actually rebooted.
    pub enable_reboot: bool,
    /// Whether GHR submission runs after a sweep.
    pub enable_ghr: bool,
    /// Maximum concurrently-diagnosed nodes.
    pub max_parallel: usize,
    /// Timeout for a single remote check invocation.
    pub check_timeout: Duration,
    /// Overall deadline for one orchestrator run.
    pub run_deadline: Duration,
    /// Grace period before polling a rebooted node for reachability.
    pub recheck_interval: Duration,
    /// How long to wait for a rebooted node to become reachable again.
    pub reboot_wait: Duration,
    /// Path of the hardware health check script on each node.
    pub health_check_script: String,
    /// Health check tooling version, recorded in results.
    pub health_check_version: String,
    /// GHR settings.
    pub ghr: GhrConfig,
    /// Teams webhook URL; notifications are skipped when unset.
    pub teams_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_prefix: "slurm00-htc".to_string(),
            node_count: 2,
            nccl_bw_threshold: 480.0,
            nccl_multi_bw_threshold: 350.0,
            max_reboot_count: 1,
            enable_reboot: true,
            enable_ghr: true,
            max_parallel: 10,
            check_timeout: Duration::from_secs(600),
            run_deadline: Duration::from_secs(1800),
            recheck_interval: Duration::from_secs(30),
            reboot_wait: Duration::from_secs(300),
            health_check_script:
                "/opt/azurehpc/test/azurehpc-health-checks/run-health-checks.sh".to_string(),
            health_check_version: "v0.4.4".to_string(),
            ghr: GhrConfig {
                endpoint: "https://ghr.example.com/api/v1/ghr".to_string(),
                skip_hours: 24,
                max_nodes: 10,
                max_retries: 3,
                retry_interval: Duration::from_secs(5),
                impact_category: "NHC2001".to_string(),
                impact_description: String::new(),
            },
            teams_webhook_url: None,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// The indirection keeps tests deterministic — no process-global
    /// environment mutation needed to exercise parsing and validation.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            node_prefix: lookup("NODE_PREFIX").unwrap_or(defaults.node_prefix),
            node_count: parse_var(&lookup, "NODE_COUNT", defaults.node_count)?,
            nccl_bw_threshold: parse_var(&lookup, "NCCL_BW_THRESHOLD", defaults.nccl_bw_threshold)?,
            nccl_multi_bw_threshold: parse_var(
                &lookup,
                "NCCL_MULTI_BW_THRESHOLD",
                defaults.nccl_multi_bw_threshold,
            )?,
            max_reboot_count: parse_var(&lookup, "MAX_REBOOT_COUNT", defaults.max_reboot_count)?,
            enable_reboot: bool_var(&lookup, "ENABLE_REBOOT_ON_FAILURE", defaults.enable_reboot),
            enable_ghr: bool_var(&lookup, "ENABLE_GHR", defaults.enable_ghr),
            max_parallel: parse_var(&lookup, "MAX_PARALLEL", defaults.max_parallel)?,
            check_timeout: secs_var(&lookup, "CHECK_TIMEOUT_SECS", defaults.check_timeout)?,
            run_deadline: secs_var(&lookup, "RUN_DEADLINE_SECS", defaults.run_deadline)?,
            recheck_interval: secs_var(
                &lookup,
                "RECHECK_INTERVAL_SECONDS",
                defaults.recheck_interval,
            )?,
            reboot_wait: secs_var(&lookup, "REBOOT_WAIT_SECS", defaults.reboot_wait)?,
            health_check_script: lookup("HEALTH_CHECK_SCRIPT")
                .unwrap_or(defaults.health_check_script),
            health_check_version: lookup("HEALTH_CHECK_VERSION")
                .unwrap_or(defaults.health_check_version),
            ghr: GhrConfig {
                endpoint: lookup("GHR_ENDPOINT").unwrap_or(defaults.ghr.endpoint),
                skip_hours: parse_var(&lookup, "GHR_SKIP_HOURS", defaults.ghr.skip_hours)?,
                max_nodes: parse_var(&lookup, "GHR_MAX_NODES", defaults.ghr.max_nodes)?,
                max_retries: parse_var(&lookup, "GHR_MAX_RETRIES", defaults.ghr.max_retries)?,
                retry_interval: secs_var(
                    &lookup,
                    "GHR_RETRY_INTERVAL_SEC",
                    defaults.ghr.retry_interval,
                )?,
                impact_category: lookup("GHR_IMPACT_CATEGORY")
                    .unwrap_or(defaults.ghr.impact_category),
                impact_description: lookup("GHR_IMPACT_DESCRIPTION")
                    .unwrap_or(defaults.ghr.impact_description),
            },
            teams_webhook_url: lookup("TEAMS_WEBHOOK_URL").filter(|url| !url.is_empty()),
        };

        config.validate()?;
        debug!(
            nodes = config.node_count,
            max_parallel = config.max_parallel,
            max_reboot_count = config.max_reboot_count,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject configurations that must not start a run.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.nccl_bw_threshold.is_finite() || self.nccl_bw_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "NCCL_BW_THRESHOLD",
                detail: format!("must be a positive number, got {}", self.nccl_bw_threshold),
            });
        }
        if !self.nccl_multi_bw_threshold.is_finite() || self.nccl_multi_bw_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "NCCL_MULTI_BW_THRESHOLD",
                detail: format!(
                    "must be a positive number, got {}",
                    self.nccl_multi_bw_threshold
                ),
            });
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_PARALLEL",
                detail: "concurrency cap must be at least 1".to_string(),
            });
        }
        if self.check_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "CHECK_TIMEOUT_SECS",
                detail: "per-check timeout must be positive".to_string(),
            });
        }
        if self.run_deadline.is_zero() {
            return Err(ConfigError::Invalid {
                name: "RUN_DEADLINE_SECS",
                detail: "run deadline must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The full cluster inventory: `{prefix}-1` through `{prefix}-{count}`.
    pub fn inventory(&self) -> Vec<String> {
        (1..=self.node_count)
            .map(|i| format!("{}-{i}", self.node_prefix))
            .collect()
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> ConfigResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { name, value: raw }),
        None => Ok(default),
    }
}

fn secs_var<F>(lookup: &F, name: &'static str, default: Duration) -> ConfigResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, name, default.as_secs()).map(Duration::from_secs)
}

/// Truthy strings follow the cluster tooling convention: "1", "true", "yes".
fn bool_var<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}

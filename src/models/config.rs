//! Configuration models for picompute.
//!
//! Everything that differs between deployments (endpoints, keys, prices,
//! retry budget) is loaded from a TOML file. Nothing here talks to the
//! network.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::PricingSpec;

/// Top-level configuration for picompute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Retry budget and convergence policy
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Worker transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Compute services keyed by service kind (e.g. "lambda", "ec2")
    pub services: HashMap<String, ServiceConfig>,
}

/// Convergence controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum number of rounds per run, failed rounds included
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Rounding used by the precision check
    #[serde(default)]
    pub rounding: RoundingMode,

    /// Which rounds are billed
    #[serde(default)]
    pub billing: BillingPolicy,
}

fn default_max_retries() -> u32 {
    10
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            rounding: RoundingMode::default(),
            billing: BillingPolicy::default(),
        }
    }
}

/// Rounding applied to both Pi and the estimate before comparing them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Ties go to the even neighbour (banker's rounding)
    #[default]
    HalfEven,
    /// Ties go away from zero
    HalfAwayFromZero,
}

/// Which elapsed time contributes to the reported duration and cost.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingPolicy {
    /// Every successful invocation is billed, even in discarded rounds
    #[default]
    AllAttempts,
    /// Only rounds whose partials entered the history are billed
    CompletedRounds,
}

/// Worker transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-invocation timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    60
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Decimal places kept for figures in the run result
    #[serde(default = "default_round_values_dp")]
    pub round_values_dp: u32,

    /// Where to write the JSON run report (optional)
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

/// More places than an f64 carries digits for is meaningless.
pub const MAX_ROUND_VALUES_DP: u32 = 15;

fn default_round_values_dp() -> u32 {
    12
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            round_values_dp: default_round_values_dp(),
            report_path: None,
        }
    }
}

/// One compute service (a family of interchangeable workers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// How workers of this service are reached
    pub capacity: CapacityConfig,

    /// Pricing model used for cost estimation
    pub pricing: PricingSpec,

    /// API key sent as `x-api-key` (supports `${ENV_VAR}` expansion)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Worker topology of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CapacityConfig {
    /// A fixed set of worker hosts; each run needs one host per worker
    Fixed { hosts: Vec<String> },
    /// A single gateway that scales out per request (serverless functions)
    Elastic {
        endpoint: String,
        #[serde(default = "default_max_workers")]
        max_workers: usize,
    },
}

fn default_max_workers() -> usize {
    10
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    /// B_i(values are in range) → Result, via [`Config::validate`]
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coordinator.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.max_retries must be at least 1".to_string(),
            ));
        }

        if self.output.round_values_dp > MAX_ROUND_VALUES_DP {
            return Err(ConfigError::Invalid(format!(
                "output.round_values_dp must be at most {MAX_ROUND_VALUES_DP}"
            )));
        }

        if self.services.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [services.<kind>] table is required".to_string(),
            ));
        }

        for (kind, service) in &self.services {
            match &service.capacity {
                CapacityConfig::Fixed { hosts } if hosts.is_empty() => {
                    return Err(ConfigError::Invalid(format!(
                        "service '{kind}': fixed capacity needs at least one host"
                    )));
                }
                CapacityConfig::Elastic { max_workers: 0, .. } => {
                    return Err(ConfigError::Invalid(format!(
                        "service '{kind}': max_workers must be at least 1"
                    )));
                }
                _ => {}
            }

            service
                .pricing
                .validate()
                .map_err(|msg| ConfigError::Invalid(format!("service '{kind}': {msg}")))?;
        }

        Ok(())
    }

    /// Look up a service by kind.
    pub fn service(&self, kind: &str) -> Result<&ServiceConfig, ConfigError> {
        self.services
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownService(kind.to_string()))
    }

    /// Resolve the API key of a service from config or environment.
    ///
    /// `Ok(None)` means the service does not use a key.
    pub fn resolve_api_key(&self, kind: &str) -> Result<Option<String>, ConfigError> {
        let service = self.service(kind)?;

        if let Some(key) = &service.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        if let Some(env_var) = &service.api_key_env {
            return std::env::var(env_var)
                .map(Some)
                .map_err(|_| ConfigError::MissingApiKey {
                    service: kind.to_string(),
                    env_var: env_var.clone(),
                });
        }

        Ok(None)
    }

    /// Service kinds sorted by name.
    pub fn service_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.services.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown service kind: '{0}' (no [services.{0}] table)")]
    UnknownService(String),

    #[error("Missing API key for service '{service}': set {env_var} env var or api_key in config")]
    MissingApiKey { service: String, env_var: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[coordinator]
max_retries = 4
rounding = "half_away_from_zero"
billing = "completed_rounds"

[services.lambda]
api_key = "static-key"
capacity = { mode = "elastic", endpoint = "https://example.test/calculation" }
pricing = { model = "gb_second", memory_mb = 512, rate_per_gb_second = 0.0000166667 }

[services.ec2]
capacity = { mode = "fixed", hosts = ["http://10.0.0.1/calculation", "http://10.0.0.2/calculation"] }
pricing = { model = "hourly", rate_per_hour = 0.0116 }
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config() {
        let file = write_config(SAMPLE);
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.coordinator.max_retries, 4);
        assert_eq!(config.coordinator.rounding, RoundingMode::HalfAwayFromZero);
        assert_eq!(config.coordinator.billing, BillingPolicy::CompletedRounds);
        assert_eq!(config.transport.timeout_secs, 60);
        assert_eq!(config.output.round_values_dp, 12);
        assert_eq!(config.service_kinds(), vec!["ec2", "lambda"]);

        match &config.service("lambda").unwrap().capacity {
            CapacityConfig::Elastic {
                endpoint,
                max_workers,
            } => {
                assert_eq!(endpoint, "https://example.test/calculation");
                assert_eq!(*max_workers, 10);
            }
            other => panic!("unexpected capacity {other:?}"),
        }
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let file = write_config(
            r#"
[services.ec2]
capacity = { mode = "fixed", hosts = ["http://10.0.0.1/calculation"] }
pricing = { model = "hourly", rate_per_hour = 0.0116 }
"#,
        );
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.coordinator.max_retries, 10);
        assert_eq!(config.coordinator.rounding, RoundingMode::HalfEven);
        assert_eq!(config.coordinator.billing, BillingPolicy::AllAttempts);
    }

    #[test]
    fn test_rejects_empty_host_list() {
        let file = write_config(
            r#"
[services.ec2]
capacity = { mode = "fixed", hosts = [] }
pricing = { model = "hourly", rate_per_hour = 0.0116 }
"#,
        );
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_retries() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.coordinator.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_round_values_dp_bounded() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.output.round_values_dp = MAX_ROUND_VALUES_DP;
        assert!(config.validate().is_ok());

        config.output.round_values_dp = 400;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_service() {
        let file = write_config(SAMPLE);
        let config = Config::from_file(file.path()).unwrap();
        assert!(matches!(
            config.service("gce"),
            Err(ConfigError::UnknownService(kind)) if kind == "gce"
        ));
    }

    #[test]
    fn test_resolve_api_key() {
        let file = write_config(SAMPLE);
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.resolve_api_key("lambda").unwrap().as_deref(),
            Some("static-key")
        );
        assert_eq!(config.resolve_api_key("ec2").unwrap(), None);
    }

    #[test]
    fn test_missing_api_key_env() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        let lambda = config.services.get_mut("lambda").unwrap();
        lambda.api_key = None;
        lambda.api_key_env = Some("PICOMPUTE_TEST_UNSET_KEY_VAR".to_string());

        let err = config.resolve_api_key("lambda").unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholder() {
        assert_eq!(
            expand_env_vars("key-${PICOMPUTE_TEST_NOT_SET}"),
            "key-${PICOMPUTE_TEST_NOT_SET}"
        );
    }
}

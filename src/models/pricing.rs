//! Cost estimation for compute time.
//!
//! Prices are configuration. The estimator is built once per run, so an
//! unknown service kind surfaces at setup, never mid-run.

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Pricing model of a compute service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PricingSpec {
    /// Billed per GB-second of configured memory (serverless functions)
    GbSecond {
        memory_mb: f64,
        rate_per_gb_second: f64,
    },
    /// Billed per hour of instance time
    Hourly { rate_per_hour: f64 },
}

impl PricingSpec {
    /// Cost of `duration_secs` of compute under this model.
    pub fn cost(&self, duration_secs: f64) -> f64 {
        match *self {
            Self::GbSecond {
                memory_mb,
                rate_per_gb_second,
            } => duration_secs * memory_mb / 1024.0 * rate_per_gb_second,
            Self::Hourly { rate_per_hour } => duration_secs / 3600.0 * rate_per_hour,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let values = match *self {
            Self::GbSecond {
                memory_mb,
                rate_per_gb_second,
            } => [memory_mb, rate_per_gb_second],
            Self::Hourly { rate_per_hour } => [rate_per_hour, 0.0],
        };

        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("pricing values must be finite and non-negative".to_string());
        }
        Ok(())
    }
}

/// Converts elapsed compute time into money for one service kind.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    service_kind: String,
    pricing: PricingSpec,
}

impl CostEstimator {
    pub fn new(service_kind: impl Into<String>, pricing: PricingSpec) -> Self {
        Self {
            service_kind: service_kind.into(),
            pricing,
        }
    }

    /// Build the estimator for `service_kind` from configuration.
    pub fn for_service(config: &Config, service_kind: &str) -> Result<Self, ConfigError> {
        let service = config.service(service_kind)?;
        Ok(Self::new(service_kind, service.pricing))
    }

    pub fn service_kind(&self) -> &str {
        &self.service_kind
    }

    /// Estimated cost of `duration_secs` of compute.
    pub fn estimate_cost(&self, duration_secs: f64) -> f64 {
        self.pricing.cost(duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_gb_second_cost() {
        let spec = PricingSpec::GbSecond {
            memory_mb: 512.0,
            rate_per_gb_second: 0.0000166667,
        };
        // 10s at half a GB
        assert!(close(spec.cost(10.0), 10.0 * 0.5 * 0.0000166667));
    }

    #[test]
    fn test_hourly_cost() {
        let estimator = CostEstimator::new("ec2", PricingSpec::Hourly { rate_per_hour: 0.0116 });
        assert!(close(estimator.estimate_cost(3600.0), 0.0116));
        assert!(close(estimator.estimate_cost(0.0), 0.0));
        assert_eq!(estimator.service_kind(), "ec2");
    }

    #[test]
    fn test_negative_price_rejected() {
        let spec = PricingSpec::Hourly {
            rate_per_hour: -1.0,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_unknown_service_fails_at_setup() {
        let config: Config = toml::from_str(
            r#"
[services.ec2]
capacity = { mode = "fixed", hosts = ["http://10.0.0.1/calculation"] }
pricing = { model = "hourly", rate_per_hour = 0.0116 }
"#,
        )
        .unwrap();

        assert!(CostEstimator::for_service(&config, "ec2").is_ok());
        assert!(matches!(
            CostEstimator::for_service(&config, "lambda"),
            Err(ConfigError::UnknownService(_))
        ));
    }
}

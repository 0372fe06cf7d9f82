//! Worker targets and capacity providers.
//!
//! Provisioning compute nodes is someone else's job. A provider only reports
//! which workers can be addressed right now and whether a run of a given
//! width fits.

use std::future::Future;
use tracing::{debug, info};

use crate::models::{CapacityConfig, Config, PiError, Result};

/// Address of one worker slot.
///
/// Targets in a run have distinct slots. Elastic services hand out several
/// slots that share one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTarget {
    pub slot: usize,
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl WorkerTarget {
    pub fn new(slot: usize, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            slot,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// In-process target for the local adapter.
    pub fn local(slot: usize) -> Self {
        Self::new(slot, format!("local://worker-{slot}"), None)
    }
}

/// Source of worker targets for a service.
pub trait CapacityProvider: Send + Sync {
    /// Workers that can take a work unit right now.
    fn list_available_workers(&self) -> impl Future<Output = Result<Vec<WorkerTarget>>> + Send;

    /// Succeeds once `n` workers are ready.
    fn ensure_capacity(&self, n: usize) -> impl Future<Output = Result<()>> + Send;

    /// Let go of every worker held for this service.
    fn release_all_workers(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A fixed list of worker hosts (long-running instances).
#[derive(Debug, Clone)]
pub struct FixedCapacity {
    service_kind: String,
    hosts: Vec<String>,
    api_key: Option<String>,
}

impl FixedCapacity {
    pub fn new(service_kind: impl Into<String>, hosts: Vec<String>, api_key: Option<String>) -> Self {
        Self {
            service_kind: service_kind.into(),
            hosts,
            api_key,
        }
    }
}

impl CapacityProvider for FixedCapacity {
    async fn list_available_workers(&self) -> Result<Vec<WorkerTarget>> {
        Ok(self
            .hosts
            .iter()
            .enumerate()
            .map(|(slot, host)| WorkerTarget::new(slot, host.clone(), self.api_key.clone()))
            .collect())
    }

    async fn ensure_capacity(&self, n: usize) -> Result<()> {
        if self.hosts.len() < n {
            return Err(PiError::InsufficientCapacity {
                service: self.service_kind.clone(),
                requested: n,
                available: self.hosts.len(),
            });
        }
        debug!(service = %self.service_kind, requested = n, hosts = self.hosts.len(), "Capacity available");
        Ok(())
    }

    async fn release_all_workers(&self) -> Result<()> {
        info!(
            service = %self.service_kind,
            hosts = self.hosts.len(),
            "Fixed hosts are managed outside picompute, nothing to release"
        );
        Ok(())
    }
}

/// One gateway endpoint that fans out to as many function instances as asked.
#[derive(Debug, Clone)]
pub struct ElasticCapacity {
    service_kind: String,
    endpoint: String,
    max_workers: usize,
    api_key: Option<String>,
}

impl ElasticCapacity {
    pub fn new(
        service_kind: impl Into<String>,
        endpoint: impl Into<String>,
        max_workers: usize,
        api_key: Option<String>,
    ) -> Self {
        Self {
            service_kind: service_kind.into(),
            endpoint: endpoint.into(),
            max_workers,
            api_key,
        }
    }
}

impl CapacityProvider for ElasticCapacity {
    async fn list_available_workers(&self) -> Result<Vec<WorkerTarget>> {
        Ok((0..self.max_workers)
            .map(|slot| WorkerTarget::new(slot, self.endpoint.clone(), self.api_key.clone()))
            .collect())
    }

    async fn ensure_capacity(&self, n: usize) -> Result<()> {
        if n > self.max_workers {
            return Err(PiError::InsufficientCapacity {
                service: self.service_kind.clone(),
                requested: n,
                available: self.max_workers,
            });
        }
        Ok(())
    }

    async fn release_all_workers(&self) -> Result<()> {
        debug!(service = %self.service_kind, "Elastic service holds no workers");
        Ok(())
    }
}

/// Either provider, chosen by the service's configured capacity mode.
#[derive(Debug, Clone)]
pub enum ServiceCapacity {
    Fixed(FixedCapacity),
    Elastic(ElasticCapacity),
}

impl ServiceCapacity {
    /// Build the provider for `service_kind` from configuration.
    pub fn from_config(config: &Config, service_kind: &str) -> Result<Self> {
        let service = config.service(service_kind)?;
        let api_key = config.resolve_api_key(service_kind)?;

        Ok(match &service.capacity {
            CapacityConfig::Fixed { hosts } => {
                Self::Fixed(FixedCapacity::new(service_kind, hosts.clone(), api_key))
            }
            CapacityConfig::Elastic {
                endpoint,
                max_workers,
            } => Self::Elastic(ElasticCapacity::new(
                service_kind,
                endpoint.clone(),
                *max_workers,
                api_key,
            )),
        })
    }
}

impl CapacityProvider for ServiceCapacity {
    async fn list_available_workers(&self) -> Result<Vec<WorkerTarget>> {
        match self {
            Self::Fixed(p) => p.list_available_workers().await,
            Self::Elastic(p) => p.list_available_workers().await,
        }
    }

    async fn ensure_capacity(&self, n: usize) -> Result<()> {
        match self {
            Self::Fixed(p) => p.ensure_capacity(n).await,
            Self::Elastic(p) => p.ensure_capacity(n).await,
        }
    }

    async fn release_all_workers(&self) -> Result<()> {
        match self {
            Self::Fixed(p) => p.release_all_workers().await,
            Self::Elastic(p) => p.release_all_workers().await,
        }
    }
}

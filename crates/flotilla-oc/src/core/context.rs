//!
//! # Orchestration Controller Metadata
//!
//! The global context holds one store context per managed kind plus the
//! shared feeds every controller needs: the instance runtime, the
//! utilization cache and the change event log.
//!
use std::sync::Arc;

use flotilla_metadata::autoscaler::AutoscalerSpec;
use flotilla_metadata::configmap::ConfigMapSpec;
use flotilla_metadata::deployment::DeploymentSpec;
use flotilla_metadata::instance::InstanceSpec;
use flotilla_metadata::secret::SecretSpec;
use flotilla_metadata::service::ServiceSpec;
use flotilla_metadata::volume::VolumeSpec;
use flotilla_types::event::StickyEvent;

use crate::config::OcConfig;
use crate::core::events::{EventLog, SharedEventLog};
use crate::core::metrics::{MetricsCache, SharedMetricsCache};
use crate::dispatcher::store::StoreContext;
use crate::runtime::SharedRuntime;

pub type SharedContext = Arc<Context>;

/// Global context for the orchestration controller.
/// This is where we store globally accessible data.
#[derive(Debug)]
pub struct Context {
    deployments: StoreContext<DeploymentSpec>,
    instances: StoreContext<InstanceSpec>,
    services: StoreContext<ServiceSpec>,
    configmaps: StoreContext<ConfigMapSpec>,
    secrets: StoreContext<SecretSpec>,
    volumes: StoreContext<VolumeSpec>,
    autoscalers: StoreContext<AutoscalerSpec>,
    metrics: SharedMetricsCache,
    events: SharedEventLog,
    runtime: SharedRuntime,
    shutdown: Arc<StickyEvent>,
    config: OcConfig,
}

// -----------------------------------
// OcMetadata - Implementation
// -----------------------------------

impl Context {
    pub fn shared_metadata(config: OcConfig, runtime: SharedRuntime) -> Arc<Self> {
        Arc::new(Self::new(config, runtime))
    }

    /// private function to provision metadata
    fn new(config: OcConfig, runtime: SharedRuntime) -> Self {
        Self {
            deployments: StoreContext::new(),
            instances: StoreContext::new(),
            services: StoreContext::new(),
            configmaps: StoreContext::new(),
            secrets: StoreContext::new(),
            volumes: StoreContext::new(),
            autoscalers: StoreContext::new(),
            metrics: MetricsCache::shared(),
            events: EventLog::shared(config.event_log_capacity),
            runtime,
            shutdown: StickyEvent::shared(),
            config,
        }
    }

    /// reference to deployments
    pub fn deployments(&self) -> &StoreContext<DeploymentSpec> {
        &self.deployments
    }

    /// reference to instances
    pub fn instances(&self) -> &StoreContext<InstanceSpec> {
        &self.instances
    }

    /// reference to services
    pub fn services(&self) -> &StoreContext<ServiceSpec> {
        &self.services
    }

    pub fn configmaps(&self) -> &StoreContext<ConfigMapSpec> {
        &self.configmaps
    }

    pub fn secrets(&self) -> &StoreContext<SecretSpec> {
        &self.secrets
    }

    pub fn volumes(&self) -> &StoreContext<VolumeSpec> {
        &self.volumes
    }

    pub fn autoscalers(&self) -> &StoreContext<AutoscalerSpec> {
        &self.autoscalers
    }

    /// utilization sample cache
    pub fn metrics(&self) -> &SharedMetricsCache {
        &self.metrics
    }

    /// change event log
    pub fn events(&self) -> &SharedEventLog {
        &self.events
    }

    /// instance runtime driver
    pub fn runtime(&self) -> &SharedRuntime {
        &self.runtime
    }

    /// controller-wide shutdown event
    pub fn shutdown(&self) -> &Arc<StickyEvent> {
        &self.shutdown
    }

    /// reference to config
    pub fn config(&self) -> &OcConfig {
        &self.config
    }
}

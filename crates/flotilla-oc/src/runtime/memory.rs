//!
//! # In-memory runtime simulation
//!
//! Launches are recorded in a map, probe outcomes and utilization are
//! settable per instance, and launch failures can be injected. Launched
//! instances answer every probe healthy until told otherwise.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_lock::RwLock;
use async_trait::async_trait;
use tracing::debug;

use flotilla_metadata::instance::InstanceSpec;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::template::{ProbeKind, ProbeSpec};
use flotilla_types::UtilizationPercent;

use super::{InstanceRuntime, ProbeOutcome, RuntimeError};

#[derive(Debug, Clone)]
struct SimulatedInstance {
    image: String,
    startup: ProbeOutcome,
    readiness: ProbeOutcome,
    liveness: ProbeOutcome,
    utilization: Option<(UtilizationPercent, UtilizationPercent)>,
}

impl SimulatedInstance {
    fn new(image: String) -> Self {
        Self {
            image,
            startup: ProbeOutcome::Healthy,
            readiness: ProbeOutcome::Healthy,
            liveness: ProbeOutcome::Healthy,
            utilization: None,
        }
    }

    fn outcome(&self, kind: ProbeKind) -> ProbeOutcome {
        match kind {
            ProbeKind::Startup => self.startup,
            ProbeKind::Readiness => self.readiness,
            ProbeKind::Liveness => self.liveness,
        }
    }

    fn set_outcome(&mut self, kind: ProbeKind, outcome: ProbeOutcome) {
        match kind {
            ProbeKind::Startup => self.startup = outcome,
            ProbeKind::Readiness => self.readiness = outcome,
            ProbeKind::Liveness => self.liveness = outcome,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    instances: RwLock<HashMap<ObjectKey, SimulatedInstance>>,
    fail_next_launches: AtomicU32,
    launch_delay_ms: AtomicU64,
}

impl SimulatedRuntime {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// make the next `count` launches fail
    pub fn fail_next_launches(&self, count: u32) {
        self.fail_next_launches.store(count, Ordering::SeqCst);
    }

    /// delay applied inside every launch call
    pub fn set_launch_delay(&self, delay: Duration) {
        self.launch_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn set_probe(&self, key: &ObjectKey, kind: ProbeKind, outcome: ProbeOutcome) {
        if let Some(instance) = self.instances.write().await.get_mut(key) {
            instance.set_outcome(kind, outcome);
        }
    }

    pub async fn set_utilization(
        &self,
        key: &ObjectKey,
        cpu_percent: UtilizationPercent,
        memory_percent: UtilizationPercent,
    ) {
        if let Some(instance) = self.instances.write().await.get_mut(key) {
            instance.utilization = Some((cpu_percent, memory_percent));
        }
    }

    pub async fn is_running(&self, key: &ObjectKey) -> bool {
        self.instances.read().await.contains_key(key)
    }

    pub async fn running_count(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn running_keys(&self) -> Vec<ObjectKey> {
        self.instances.read().await.keys().cloned().collect()
    }

    pub async fn image_of(&self, key: &ObjectKey) -> Option<String> {
        self.instances
            .read()
            .await
            .get(key)
            .map(|instance| instance.image.clone())
    }
}

#[async_trait]
impl InstanceRuntime for SimulatedRuntime {
    async fn launch(&self, key: &ObjectKey, spec: &InstanceSpec) -> Result<(), RuntimeError> {
        let delay_ms = self.launch_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let remaining = self.fail_next_launches.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next_launches
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(RuntimeError::LaunchFailed {
                key: key.clone(),
                reason: "injected launch failure".to_owned(),
            });
        }

        debug!(%key, image = %spec.template.image, "simulated launch");
        self.instances
            .write()
            .await
            .insert(key.clone(), SimulatedInstance::new(spec.template.image.clone()));
        Ok(())
    }

    async fn terminate(&self, key: &ObjectKey) -> Result<(), RuntimeError> {
        debug!(%key, "simulated terminate");
        self.instances.write().await.remove(key);
        Ok(())
    }

    async fn probe(&self, key: &ObjectKey, kind: ProbeKind, _spec: &ProbeSpec) -> ProbeOutcome {
        match self.instances.read().await.get(key) {
            Some(instance) => instance.outcome(kind),
            None => ProbeOutcome::Unknown,
        }
    }

    async fn utilization(
        &self,
        key: &ObjectKey,
    ) -> Option<(UtilizationPercent, UtilizationPercent)> {
        self.instances.read().await.get(key)?.utilization
    }
}

//!
//! # Shared test environment
//!
//! Boots the whole controller stack against the simulated runtime, with
//! timers tightened so convergence is observable in test time.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use flotilla_metadata::deployment::DeploymentSpec;
use flotilla_metadata::extended::ObjectType;
use flotilla_metadata::instance::InstanceLocalStorePolicy;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::template::InstanceTemplate;
use flotilla_oc::config::OcConfig;
use flotilla_oc::core::SharedContext;
use flotilla_oc::dispatcher::metadata::ObjMeta;
use flotilla_oc::runtime::SimulatedRuntime;
use flotilla_oc::services::{ObjectView, OcAdmin};
use flotilla_oc::start_main_loop;
use flotilla_oc::stores::instance::InstanceMetadata;

pub fn fast_config() -> OcConfig {
    OcConfig {
        resync_interval: Duration::from_millis(100),
        autoscaler_interval: Duration::from_millis(50),
        backoff_min: Duration::from_millis(50),
        backoff_max: Duration::from_millis(500),
        ..Default::default()
    }
}

pub struct TestEnv {
    pub ctx: SharedContext,
    pub admin: OcAdmin,
    pub runtime: Arc<SimulatedRuntime>,
}

impl TestEnv {
    pub async fn start() -> Self {
        Self::start_with(fast_config()).await
    }

    /// state persisted under `data_dir`, reloaded by the next start
    pub async fn start_on(data_dir: &Path) -> Self {
        let mut config = fast_config();
        config.data_dir = Some(data_dir.to_path_buf());
        Self::start_with(config).await
    }

    pub async fn start_with(config: OcConfig) -> Self {
        let runtime = SimulatedRuntime::shared();
        let ctx = start_main_loop(config, runtime.clone())
            .await
            .expect("controller start");
        let admin = OcAdmin::new(ctx.clone());
        Self { ctx, admin, runtime }
    }

    /// stop the control loops and give them a beat to wind down
    pub async fn stop(self) {
        self.ctx.shutdown().notify();
        sleep(Duration::from_millis(100)).await;
    }

    pub async fn deployment_view(&self, key: &ObjectKey) -> ObjectView<DeploymentSpec> {
        self.admin
            .get_status(ObjectType::Deployment, key)
            .await
            .expect("deployment status")
            .as_deployment()
            .cloned()
            .expect("deployment view")
    }

    /// owned instances that are not draining
    pub async fn live_instances(&self, owner: &ObjectKey) -> Vec<InstanceMetadata<ObjMeta>> {
        self.ctx
            .instances()
            .store()
            .owned_by(owner)
            .await
            .into_iter()
            .filter(|i| !i.is_being_deleted())
            .collect()
    }

    pub async fn live_keys(&self, owner: &ObjectKey) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self
            .live_instances(owner)
            .await
            .iter()
            .map(|i| i.key_owned())
            .collect();
        keys.sort();
        keys
    }

    pub async fn ready_count(&self, owner: &ObjectKey) -> usize {
        self.live_instances(owner)
            .await
            .iter()
            .filter(|i| i.status.phase.is_ready())
            .count()
    }
}

/// poll until the condition holds, up to ten seconds
pub async fn wait_for<F>(what: &str, mut condition: F)
where
    F: AsyncFnMut() -> bool,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

pub fn web_key() -> ObjectKey {
    ObjectKey::new("default", "web")
}

pub fn web_deployment(replicas: u16) -> DeploymentSpec {
    versioned_deployment(replicas, "flask-app:v1")
}

pub fn versioned_deployment(replicas: u16, image: &str) -> DeploymentSpec {
    DeploymentSpec::new(replicas, InstanceTemplate::with_image(image))
        .with_labels([("app", "web")])
}

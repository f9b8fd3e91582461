//!
//! # Initialization routines for the orchestration controller
//!
//! All processing engines are hooked up here. Each managed kind gets its
//! store rehydrated, a write dispatcher, a persistence mirror (when a data
//! directory is configured) and a change event relay; the control loops
//! start on top of the live stores.

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use flotilla_metadata::autoscaler::AutoscalerSpec;
use flotilla_metadata::configmap::ConfigMapSpec;
use flotilla_metadata::core::Spec;
use flotilla_metadata::deployment::DeploymentSpec;
use flotilla_metadata::extended::SpecExt;
use flotilla_metadata::instance::InstanceSpec;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::secret::SecretSpec;
use flotilla_metadata::service::ServiceSpec;
use flotilla_metadata::volume::VolumeSpec;

use crate::config::OcConfig;
use crate::controllers::autoscalers::AutoscalerController;
use crate::controllers::deployments::DeploymentController;
use crate::controllers::health::HealthSupervisor;
use crate::controllers::instances::InstanceController;
use crate::controllers::services::ServiceController;
use crate::controllers::volumes::VolumeController;
use crate::core::{Context, SharedContext};
use crate::core::events::EventRelay;
use crate::dispatcher::dispatcher::StoreDispatcher;
use crate::dispatcher::metadata::{LocalStorage, PersistenceController};
use crate::dispatcher::store::StoreContext;
use crate::runtime::SharedRuntime;

/// Bring the control plane up over the given instance runtime and return
/// its live context. Every kind's store is seeded (from the data directory
/// when one is configured, empty otherwise) before any loop starts, so the
/// first reconciliation pass always sees the rehydrated world.
pub async fn start_main_loop(config: OcConfig, runtime: SharedRuntime) -> Result<SharedContext> {
    let ctx = Context::shared_metadata(config, runtime);

    init_kind::<DeploymentSpec>(&ctx, ctx.deployments()).await?;
    init_kind::<InstanceSpec>(&ctx, ctx.instances()).await?;
    init_kind::<ServiceSpec>(&ctx, ctx.services()).await?;
    init_kind::<ConfigMapSpec>(&ctx, ctx.configmaps()).await?;
    init_kind::<SecretSpec>(&ctx, ctx.secrets()).await?;
    init_kind::<VolumeSpec>(&ctx, ctx.volumes()).await?;
    init_kind::<AutoscalerSpec>(&ctx, ctx.autoscalers()).await?;

    DeploymentController::start(ctx.clone());
    InstanceController::start(ctx.clone());
    HealthSupervisor::start(ctx.clone());
    AutoscalerController::start(ctx.clone());
    ServiceController::start(ctx.clone());
    VolumeController::start(ctx.clone());

    info!("controller started");
    Ok(ctx)
}

/// Seed one kind's store and start its dispatcher and event relay. The
/// seeding sync runs even with nothing to load: listeners block on the
/// first sync before reconciling anything.
async fn init_kind<S>(ctx: &SharedContext, store: &StoreContext<S>) -> Result<()>
where
    S: Spec<IndexKey = ObjectKey> + SpecExt + PartialEq + Serialize + DeserializeOwned,
    S::Status: PartialEq + Serialize + DeserializeOwned + Send + Sync,
{
    let loaded = match ctx.config().data_dir.as_ref() {
        Some(base) => {
            let storage = LocalStorage::<S>::open(base)?;
            let objects = storage.load_all()?;
            debug!(kind = S::LABEL, count = objects.len(), "rehydrated");
            PersistenceController::start(storage, store.store().clone(), ctx.shutdown().clone());
            objects
        }
        None => vec![],
    };
    store.store().sync_all(loaded).await;

    StoreDispatcher::start(store.clone(), ctx.shutdown().clone());
    EventRelay::start(store.clone(), ctx.events().clone(), ctx.shutdown().clone());

    Ok(())
}

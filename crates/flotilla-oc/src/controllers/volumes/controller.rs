//!
//! # Volume Controller
//!
//! Tracks which deployment each volume claim is bound to and gates claim
//! removal. A claim flagged for deletion stays in the store until no
//! deployment names it anymore, so storage never disappears under a
//! workload that still references it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use flotilla_metadata::deployment::DeploymentSpec;
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::store::ChangeListener;
use flotilla_metadata::volume::{VolumeSpec, VolumeStatus};
use flotilla_types::event::StickyEvent;

use crate::core::SharedContext;
use crate::dispatcher::metadata::ObjMeta;
use crate::stores::StoreContext;

pub struct VolumeController {
    volumes: StoreContext<VolumeSpec>,
    deployments: StoreContext<DeploymentSpec>,
    shutdown: Arc<StickyEvent>,
}

impl VolumeController {
    pub fn start(ctx: SharedContext) {
        let controller = Self {
            volumes: ctx.volumes().clone(),
            deployments: ctx.deployments().clone(),
            shutdown: ctx.shutdown().clone(),
        };

        tokio::spawn(controller.dispatch_loop());
    }

    #[instrument(skip(self), name = "VolumeControllerLoop")]
    async fn dispatch_loop(mut self) {
        info!("started");
        loop {
            if let Err(err) = self.inner_loop().await {
                error!("error with inner loop: {:#?}", err);
                debug!("sleeping 10 seconds try again");
                sleep(Duration::from_secs(10)).await;
            }
            if self.shutdown.is_set() {
                info!("shutdown");
                break;
            }
        }
    }

    async fn inner_loop(&mut self) -> Result<()> {
        use tokio::select;

        debug!("initializing listeners");
        let mut volume_listener = self.volumes.change_listener();
        let mut deployment_listener = self.deployments.change_listener();

        let initial = volume_listener.wait_for_initial_sync().await;
        deployment_listener.wait_for_initial_sync().await;
        debug!(volumes = initial.len(), "initial sync");

        let mut dirty: BTreeSet<ObjectKey> = initial.iter().map(|v| v.key_owned()).collect();

        loop {
            self.drain_volume_changes(&mut volume_listener, &mut dirty)
                .await;
            self.drain_deployment_changes(&mut deployment_listener, &mut dirty)
                .await;

            for key in std::mem::take(&mut dirty) {
                self.sync_volume(&key).await;
            }

            select! {
                _ = volume_listener.listen() => {
                    debug!("detected volume changes");
                },
                _ = deployment_listener.listen() => {
                    debug!("detected deployment changes");
                },
                _ = self.shutdown.listen() => {
                    return Ok(());
                }
            }
        }
    }

    async fn drain_volume_changes(
        &mut self,
        listener: &mut ChangeListener<VolumeSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates {
            dirty.insert(object.key_owned());
        }
        for object in deletes {
            dirty.remove(object.key());
        }
    }

    /// claims come and go with deployment specs, recheck the namespace
    async fn drain_deployment_changes(
        &mut self,
        listener: &mut ChangeListener<DeploymentSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates.iter().chain(deletes.iter()) {
            let namespace = object.key().namespace();
            let volumes = self.volumes.store().read().await;
            for volume in volumes.values() {
                if volume.key().namespace() == namespace {
                    dirty.insert(volume.key_owned());
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn sync_volume(&mut self, key: &ObjectKey) {
        let Some(volume) = self.volumes.store().value(key).await else {
            return;
        };
        let volume = volume.inner_owned();
        let claimants = self.claimants(key).await;

        if volume.is_being_deleted() {
            if claimants.is_empty() {
                debug!(%key, "claim unbound, finalizing");
                self.volumes.delete_final(key.clone()).await;
            } else {
                debug!(%key, claims = claimants.len(), "deletion held while claimed");
            }
            return;
        }

        let status = match claimants.first() {
            Some(owner) => VolumeStatus::bound(owner.clone()),
            None => VolumeStatus::default(),
        };
        if status != volume.status {
            debug!(%key, resolution = %status.resolution, "binding updated");
            self.volumes.update_status(key.clone(), status).await;
        }
    }

    /// Deployments naming this claim as their storage backing, draining
    /// ones included: their instances may still touch the data.
    async fn claimants(&self, volume: &ObjectKey) -> Vec<ObjectKey> {
        let deployments = self.deployments.store().read().await;
        let mut keys: Vec<ObjectKey> = deployments
            .values()
            .filter(|d| {
                d.key().namespace() == volume.namespace() && d.spec.claim() == Some(volume.name())
            })
            .map(|d| d.key_owned())
            .collect();
        keys.sort();
        keys
    }
}

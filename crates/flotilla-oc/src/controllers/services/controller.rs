//!
//! # Service Controller
//!
//! Keeps each service's endpoint list aligned with the ready instances of
//! its selector-matched deployments. Purely derived state: every pass
//! recomputes the list from the stores and writes it only when it differs.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use flotilla_metadata::deployment::{DeploymentLocalStorePolicy, DeploymentSpec};
use flotilla_metadata::instance::{InstanceLocalStorePolicy, InstanceSpec};
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::service::{Endpoint, ServiceSpec, ServiceStatus};
use flotilla_metadata::store::ChangeListener;
use flotilla_types::event::StickyEvent;

use crate::core::SharedContext;
use crate::dispatcher::metadata::ObjMeta;
use crate::stores::StoreContext;

pub struct ServiceController {
    services: StoreContext<ServiceSpec>,
    deployments: StoreContext<DeploymentSpec>,
    instances: StoreContext<InstanceSpec>,
    shutdown: Arc<StickyEvent>,
}

impl ServiceController {
    pub fn start(ctx: SharedContext) {
        let controller = Self {
            services: ctx.services().clone(),
            deployments: ctx.deployments().clone(),
            instances: ctx.instances().clone(),
            shutdown: ctx.shutdown().clone(),
        };

        tokio::spawn(controller.dispatch_loop());
    }

    #[instrument(skip(self), name = "ServiceControllerLoop")]
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
        let mut service_listener = self.services.change_listener();
        let mut deployment_listener = self.deployments.change_listener();
        let mut instance_listener = self.instances.change_listener();

        let initial = service_listener.wait_for_initial_sync().await;
        deployment_listener.wait_for_initial_sync().await;
        instance_listener.wait_for_initial_sync().await;
        debug!(services = initial.len(), "initial sync");

        let mut dirty: BTreeSet<ObjectKey> = initial.iter().map(|s| s.key_owned()).collect();

        loop {
            self.drain_service_changes(&mut service_listener, &mut dirty)
                .await;
            self.drain_upstream_changes(&mut deployment_listener, &mut dirty)
                .await;
            self.drain_instance_changes(&mut instance_listener, &mut dirty)
                .await;

            for key in std::mem::take(&mut dirty) {
                self.sync_service(&key).await;
            }

            select! {
                _ = service_listener.listen() => {
                    debug!("detected service changes");
                },
                _ = deployment_listener.listen() => {
                    debug!("detected deployment changes");
                },
                _ = instance_listener.listen() => {
                    debug!("detected instance changes");
                },
                _ = self.shutdown.listen() => {
                    return Ok(());
                }
            }
        }
    }

    async fn drain_service_changes(
        &mut self,
        listener: &mut ChangeListener<ServiceSpec, ObjMeta>,
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

    /// a deployment change can rewire every service in its namespace
    async fn drain_upstream_changes(
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
            self.dirty_namespace(object.key().namespace(), dirty).await;
        }
    }

    async fn drain_instance_changes(
        &mut self,
        listener: &mut ChangeListener<InstanceSpec, ObjMeta>,
        dirty: &mut BTreeSet<ObjectKey>,
    ) {
        if !listener.has_change() {
            return;
        }

        let changes = listener.sync_changes().await;
        let (updates, deletes) = changes.parts();
        for object in updates.iter().chain(deletes.iter()) {
            self.dirty_namespace(object.key().namespace(), dirty).await;
        }
    }

    async fn dirty_namespace(&self, namespace: &str, dirty: &mut BTreeSet<ObjectKey>) {
        let services = self.services.store().read().await;
        for service in services.values() {
            if service.key().namespace() == namespace {
                dirty.insert(service.key_owned());
            }
        }
    }

    #[instrument(skip(self))]
    async fn sync_service(&mut self, key: &ObjectKey) {
        let Some(service) = self.services.store().value(key).await else {
            return;
        };
        let service = service.inner_owned();
        if service.is_being_deleted() {
            return;
        }

        let mut endpoints = vec![];
        for deployment in self
            .deployments
            .store()
            .matching(key.namespace(), &service.spec.selector)
            .await
        {
            for instance in self.instances.store().owned_by(deployment.key()).await {
                if instance.is_being_deleted() || instance.status.phase.is_failed() {
                    continue;
                }
                endpoints.push(Endpoint {
                    instance: instance.key_owned(),
                    ready: instance.status.phase.is_ready(),
                });
            }
        }
        endpoints.sort();

        if endpoints != service.status.endpoints {
            let ready = endpoints.iter().filter(|e| e.ready).count();
            debug!(%key, total = endpoints.len(), ready, "endpoints updated");
            self.services
                .update_status(key.clone(), ServiceStatus { endpoints })
                .await;
        }
    }
}

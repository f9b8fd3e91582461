//!
//! # Health Supervisor
//!
//! Watches the Instance store and keeps exactly one probe task alive per up
//! instance. Tasks are torn down cooperatively through per-instance sticky
//! events when the instance stops being up, starts draining, or disappears.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use flotilla_metadata::instance::InstanceSpec;
use flotilla_metadata::key::ObjectKey;
use flotilla_types::event::StickyEvent;

use crate::core::SharedContext;
use crate::dispatcher::metadata::ObjMeta;
use crate::runtime::SharedRuntime;
use crate::stores::StoreContext;
use crate::stores::instance::InstanceMetadata;

use super::probe::ProbeTask;

type InstanceMd = InstanceMetadata<ObjMeta>;

pub struct HealthSupervisor {
    instances: StoreContext<InstanceSpec>,
    runtime: SharedRuntime,
    shutdown: Arc<StickyEvent>,
    tasks: HashMap<ObjectKey, Arc<StickyEvent>>,
}

impl HealthSupervisor {
    pub fn start(ctx: SharedContext) {
        let supervisor = Self {
            instances: ctx.instances().clone(),
            runtime: ctx.runtime().clone(),
            shutdown: ctx.shutdown().clone(),
            tasks: HashMap::new(),
        };

        tokio::spawn(supervisor.dispatch_loop());
    }

    #[instrument(skip(self), name = "HealthSupervisorLoop")]
    async fn dispatch_loop(mut self) {
        info!("started");
        loop {
            if let Err(err) = self.inner_loop().await {
                error!("error with inner loop: {:#?}", err);
                debug!("sleeping 10 seconds try again");
                sleep(Duration::from_secs(10)).await;
            }
            if self.shutdown.is_set() {
                self.cancel_all();
                info!("shutdown");
                break;
            }
        }
    }

    async fn inner_loop(&mut self) -> Result<()> {
        use tokio::select;

        debug!("initializing listeners");
        let mut listener = self.instances.change_listener();
        let initial = listener.wait_for_initial_sync().await;
        debug!(instances = initial.len(), "initial sync");

        for instance in &initial {
            self.sync_probe_task(instance);
        }

        loop {
            select! {
                _ = listener.listen() => {
                    debug!("detected instance changes");
                },
                _ = self.shutdown.listen() => {
                    return Ok(());
                }
            }

            if listener.has_change() {
                let changes = listener.sync_changes().await;
                let (updates, deletes) = changes.parts();
                for object in &updates {
                    self.sync_probe_task(object);
                }
                for object in &deletes {
                    self.cancel_task(object.key());
                }
            }
        }
    }

    fn sync_probe_task(&mut self, instance: &InstanceMd) {
        let key = instance.key();
        let should_run = instance.status.phase.is_up() && !instance.is_being_deleted();

        match (should_run, self.tasks.contains_key(key)) {
            (true, false) => {
                debug!(%key, "starting probe task");
                let cancel = StickyEvent::shared();
                self.tasks.insert(key.clone(), cancel.clone());

                let task = ProbeTask::new(
                    key.clone(),
                    instance.spec.template.probes.clone(),
                    self.instances.clone(),
                    self.runtime.clone(),
                    cancel,
                );
                tokio::spawn(task.run());
            }
            (false, true) => self.cancel_task(key),
            _ => {}
        }
    }

    fn cancel_task(&mut self, key: &ObjectKey) {
        if let Some(cancel) = self.tasks.remove(key) {
            debug!(%key, "stopping probe task");
            cancel.notify();
        }
    }

    fn cancel_all(&mut self) {
        for (_, cancel) in self.tasks.drain() {
            cancel.notify();
        }
    }
}

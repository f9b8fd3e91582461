//!
//! # Instance Driver
//!
//! Converges runtime state with the Instance store: newly created instances
//! are launched through the runtime, instances marked deleting are
//! terminated and then finalized out of the store. Launch and terminate
//! failures retry with per-key exponential backoff, so one failing instance
//! never delays the others.
//!
//! Phase writes here are `Pending -> Running` only; readiness and failure
//! phases belong to the health supervisor.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptive_backoff::prelude::{Backoff, ExponentialBackoff};
use anyhow::Result;
use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use flotilla_metadata::instance::{InstancePhase, InstanceSpec};
use flotilla_metadata::key::ObjectKey;
use flotilla_metadata::store::ChangeListener;
use flotilla_types::event::StickyEvent;

use crate::controllers::create_backoff;
use crate::core::SharedContext;
use crate::dispatcher::metadata::ObjMeta;
use crate::runtime::SharedRuntime;
use crate::stores::StoreContext;
use crate::stores::instance::InstanceMetadata;

type InstanceMd = InstanceMetadata<ObjMeta>;

struct RetryState {
    backoff: ExponentialBackoff,
    next: Instant,
}

pub struct InstanceController {
    instances: StoreContext<InstanceSpec>,
    runtime: SharedRuntime,
    op_timeout: Duration,
    backoff_min: Duration,
    backoff_max: Duration,
    shutdown: Arc<StickyEvent>,
    retries: HashMap<ObjectKey, RetryState>,
}

impl InstanceController {
    pub fn start(ctx: SharedContext) {
        let controller = Self {
            instances: ctx.instances().clone(),
            runtime: ctx.runtime().clone(),
            op_timeout: ctx.config().runtime_op_timeout,
            backoff_min: ctx.config().backoff_min,
            backoff_max: ctx.config().backoff_max,
            shutdown: ctx.shutdown().clone(),
            retries: HashMap::new(),
        };

        tokio::spawn(controller.dispatch_loop());
    }

    #[instrument(skip(self), name = "InstanceControllerLoop")]
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
        let mut listener = self.instances.change_listener();
        let initial = listener.wait_for_initial_sync().await;
        debug!(instances = initial.len(), "initial sync");

        // everything present at startup gets one pass, rehydrated
        // instances included
        let mut dirty: BTreeSet<ObjectKey> = initial.iter().map(|i| i.key_owned()).collect();

        loop {
            self.drain_changes(&mut listener, &mut dirty).await;
            self.collect_due_retries(&mut dirty);

            for key in std::mem::take(&mut dirty) {
                self.sync_instance(&key).await;
            }

            let retry_wait = self.next_retry_wait();
            select! {
                _ = listener.listen() => {
                    debug!("detected instance changes");
                },
                _ = sleep(retry_wait.unwrap_or(Duration::from_secs(3600))), if retry_wait.is_some() => {
                    debug!("retry timer due");
                },
                _ = self.shutdown.listen() => {
                    return Ok(());
                }
            }
        }
    }

    async fn drain_changes(
        &mut self,
        listener: &mut ChangeListener<InstanceSpec, ObjMeta>,
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
            self.retries.remove(object.key());
            dirty.remove(object.key());
        }
    }

    fn collect_due_retries(&self, dirty: &mut BTreeSet<ObjectKey>) {
        let now = Instant::now();
        for (key, state) in &self.retries {
            if state.next <= now {
                dirty.insert(key.clone());
            }
        }
    }

    fn next_retry_wait(&self) -> Option<Duration> {
        self.retries
            .values()
            .map(|state| state.next)
            .min()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    #[instrument(skip(self))]
    async fn sync_instance(&mut self, key: &ObjectKey) {
        let Some(instance) = self.instances.store().value(key).await else {
            self.retries.remove(key);
            return;
        };
        let instance = instance.inner_owned();

        if instance.is_being_deleted() {
            self.terminate_instance(key).await;
            return;
        }

        match instance.status.phase {
            InstancePhase::Pending => self.launch_instance(key, &instance).await,
            _ => {
                // already driven into the runtime
                self.retries.remove(key);
            }
        }
    }

    async fn launch_instance(&mut self, key: &ObjectKey, instance: &InstanceMd) {
        let failure = match timeout(self.op_timeout, self.runtime.launch(key, &instance.spec)).await
        {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!(
                "launch timed out after {}s",
                self.op_timeout.as_secs()
            )),
        };

        match failure {
            None => {
                self.retries.remove(key);
                let mut status = instance.status.clone();
                status.phase = InstancePhase::Running;
                status.started_at = Some(Utc::now());
                status.message = None;
                debug!(%key, "instance launched");
                self.instances.update_status(key.clone(), status).await;
            }
            Some(reason) => {
                let wait = self.schedule_retry(key);
                warn!(%key, %reason, retry_in = wait.as_secs(), "instance launch failed");

                let mut status = instance.status.clone();
                status.message = Some(reason);
                if status != instance.status {
                    self.instances.update_status(key.clone(), status).await;
                }
            }
        }
    }

    async fn terminate_instance(&mut self, key: &ObjectKey) {
        let failure = match timeout(self.op_timeout, self.runtime.terminate(key)).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!(
                "terminate timed out after {}s",
                self.op_timeout.as_secs()
            )),
        };

        match failure {
            None => {
                self.retries.remove(key);
                debug!(%key, "instance terminated, finalizing");
                self.instances.delete_final(key.clone()).await;
            }
            Some(reason) => {
                let wait = self.schedule_retry(key);
                warn!(%key, %reason, retry_in = wait.as_secs(), "instance terminate failed");
            }
        }
    }

    fn schedule_retry(&mut self, key: &ObjectKey) -> Duration {
        let min = self.backoff_min;
        let max = self.backoff_max;
        let state = self.retries.entry(key.clone()).or_insert_with(|| RetryState {
            backoff: create_backoff(min, max),
            next: Instant::now(),
        });
        let wait = state.backoff.wait();
        state.next = Instant::now() + wait;
        wait
    }
}

//!
//! # Store dispatcher
//!
//! Consumes the write actions queued on a [`StoreContext`] and applies
//! them to the backing store, one kind per dispatcher task. Status writes
//! go through the store's locked status path, so a slow controller can
//! never clobber a spec write that landed in between.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace};

use flotilla_state_model::core::{MetadataItem, Spec};
use flotilla_state_model::store::SpecWriteError;
use flotilla_state_model::store::actions::LSUpdate;
use flotilla_types::event::StickyEvent;

use crate::actions::WSAction;
use crate::store::StoreContext;

pub struct StoreDispatcher<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    ctx: StoreContext<S, C>,
    shutdown: Arc<StickyEvent>,
}

impl<S, C> StoreDispatcher<S, C>
where
    S: Spec + PartialEq + Send + Sync + 'static,
    S::Status: PartialEq + Send + Sync + 'static,
    S::IndexKey: Display + Send + Sync + 'static,
    C: MetadataItem + PartialEq + Send + Sync + 'static,
{
    pub fn start(ctx: StoreContext<S, C>, shutdown: Arc<StickyEvent>) {
        let dispatcher = Self { ctx, shutdown };

        tokio::spawn(dispatcher.dispatch_loop());
    }

    #[instrument(skip(self), name = "StoreDispatcher", fields(store = S::LABEL))]
    async fn dispatch_loop(self) {
        info!("started");

        let receiver = self.ctx.receiver();

        loop {
            tokio::select! {
                action = receiver.recv() => {
                    match action {
                        Ok(action) => self.apply(action).await,
                        Err(_) => {
                            debug!("action channel closed, terminating");
                            break;
                        }
                    }
                },
                _ = self.shutdown.listen() => {
                    debug!("shutdown, terminating");
                    break;
                },
            }
        }
    }

    async fn apply(&self, action: WSAction<S>) {
        trace!("applying {action}");

        match action {
            WSAction::UpdateStatus((key, status)) => {
                match self.ctx.store().put_status(&key, status).await {
                    Ok(_) => {}
                    Err(SpecWriteError::NotFound) => {
                        // the object raced a final delete; nothing to report on
                        debug!("dropped status update for missing {key}");
                    }
                    Err(err) => {
                        debug!("dropped status update for {key}: {err}");
                    }
                }
            }
            WSAction::DeleteFinal(key) => {
                self.ctx
                    .store()
                    .apply_changes(vec![LSUpdate::Delete(key)])
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time::sleep;

    use flotilla_state_model::core::MetadataItem;
    use flotilla_state_model::fixture::{TestSpec, TestStatus};
    use flotilla_types::event::StickyEvent;

    use super::StoreDispatcher;
    use crate::actions::WSAction;
    use crate::metadata::ObjMeta;
    use crate::store::StoreContext;

    type TestStoreContext = StoreContext<TestSpec, ObjMeta>;

    async fn wait_for<F>(mut condition: F)
    where
        F: AsyncFnMut() -> bool,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_updates_leave_generation_alone() {
        let ctx = TestStoreContext::new();
        let shutdown = StickyEvent::shared();
        StoreDispatcher::start(ctx.clone(), shutdown.clone());

        ctx.apply_spec("web".to_owned(), TestSpec { replicas: 3 }, None)
            .await
            .expect("create");

        ctx.send_action(WSAction::UpdateStatus((
            "web".to_owned(),
            TestStatus { ready: 3 },
        )))
        .await;

        wait_for(async || {
            ctx.store()
                .value("web")
                .await
                .map(|value| value.status == TestStatus { ready: 3 })
                .unwrap_or(false)
        })
        .await;

        let value = ctx.store().value("web").await.expect("web");
        assert_eq!(value.spec, TestSpec { replicas: 3 });
        assert_eq!(value.ctx().item().generation(), 1);

        shutdown.notify();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_update_for_missing_object_is_dropped() {
        let ctx = TestStoreContext::new();
        let shutdown = StickyEvent::shared();
        StoreDispatcher::start(ctx.clone(), shutdown.clone());

        //given an update for an object that never existed
        ctx.send_action(WSAction::UpdateStatus((
            "ghost".to_owned(),
            TestStatus { ready: 1 },
        )))
        .await;

        //when a real object is created and updated afterwards
        ctx.apply_spec("web".to_owned(), TestSpec { replicas: 1 }, None)
            .await
            .expect("create");
        ctx.send_action(WSAction::UpdateStatus((
            "web".to_owned(),
            TestStatus { ready: 1 },
        )))
        .await;

        //then the dispatcher is still alive and applied the real one
        wait_for(async || {
            ctx.store()
                .value("web")
                .await
                .map(|value| value.status == TestStatus { ready: 1 })
                .unwrap_or(false)
        })
        .await;
        assert!(ctx.store().value("ghost").await.is_none());

        shutdown.notify();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_final_removes_object() {
        let ctx = TestStoreContext::new();
        let shutdown = StickyEvent::shared();
        StoreDispatcher::start(ctx.clone(), shutdown.clone());

        ctx.apply_spec("web".to_owned(), TestSpec { replicas: 1 }, None)
            .await
            .expect("create");
        ctx.mark_deleting(&"web".to_owned()).await.expect("mark");

        ctx.send_action(WSAction::DeleteFinal("web".to_owned())).await;

        wait_for(async || !ctx.store().contains_key("web").await).await;

        shutdown.notify();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_stops_consuming() {
        let ctx = TestStoreContext::new();
        let shutdown = StickyEvent::shared();
        StoreDispatcher::start(ctx.clone(), shutdown.clone());

        ctx.apply_spec("web".to_owned(), TestSpec { replicas: 1 }, None)
            .await
            .expect("create");

        shutdown.notify();
        sleep(Duration::from_millis(50)).await;

        ctx.send_action(WSAction::UpdateStatus((
            "web".to_owned(),
            TestStatus { ready: 9 },
        )))
        .await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(
            ctx.store().value("web").await.expect("web").status,
            TestStatus::default()
        );
    }
}

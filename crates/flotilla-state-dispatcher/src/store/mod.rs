//!
//! # Store context
//!
//! Shared handle over one kind's [`LocalStore`] plus the bounded channel
//! its write actions flow through. Controllers clone the context freely:
//! the store side answers reads and checked spec writes synchronously,
//! while status and final-delete writes are queued for the kind's
//! dispatcher.

use std::fmt::Display;
use std::sync::Arc;

use async_channel::{Receiver, Sender, bounded};
use tracing::error;

use flotilla_state_model::core::{MetadataContext, MetadataItem, MetadataRevExtension, Spec};
use flotilla_state_model::store::{
    ChangeListener, LocalStore, SpecWrite, SpecWriteError,
};
use flotilla_types::Generation;

use crate::actions::WSAction;
use crate::metadata::ObjMeta;

const MAX_PENDING_ACTIONS: usize = 100;

#[derive(Debug)]
pub struct StoreContext<S, C = ObjMeta>
where
    S: Spec,
    C: MetadataItem,
{
    store: Arc<LocalStore<S, C>>,
    sender: Sender<WSAction<S>>,
    receiver: Receiver<WSAction<S>>,
}

impl<S, C> Clone for StoreContext<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<S, C> Default for StoreContext<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C> StoreContext<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    pub fn new() -> Self {
        Self::new_with_store(LocalStore::new_shared())
    }

    pub fn new_with_store(store: Arc<LocalStore<S, C>>) -> Self {
        let (sender, receiver) = bounded(MAX_PENDING_ACTIONS);
        Self {
            store,
            sender,
            receiver,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore<S, C>> {
        &self.store
    }

    pub fn receiver(&self) -> Receiver<WSAction<S>> {
        self.receiver.clone()
    }

    pub fn change_listener(&self) -> ChangeListener<S, C> {
        self.store.change_listener()
    }

    /// queue a write action for the kind's dispatcher
    pub async fn send_action(&self, action: WSAction<S>) {
        if let Err(err) = self.sender.send(action).await {
            error!("{} dispatcher unreachable: {}", S::LABEL, err);
        }
    }

    /// queue a status overwrite for the key
    pub async fn update_status(&self, key: S::IndexKey, status: S::Status) {
        self.send_action(WSAction::UpdateStatus((key, status))).await;
    }

    /// queue final removal of a drained object
    pub async fn delete_final(&self, key: S::IndexKey) {
        self.send_action(WSAction::DeleteFinal(key)).await;
    }
}

impl<S, C> StoreContext<S, C>
where
    S: Spec + PartialEq,
    S::Status: PartialEq,
    S::IndexKey: Display,
    C: MetadataRevExtension + PartialEq,
{
    /// Checked spec upsert against the backing store. A created object is
    /// given a fresh identity; `presented` carries the writer's CAS token
    /// (`None` for a blind upsert).
    pub async fn apply_spec(
        &self,
        key: S::IndexKey,
        spec: S,
        presented: Option<Generation>,
    ) -> Result<SpecWrite, SpecWriteError> {
        self.store
            .put_spec(key, spec, MetadataContext::default(), presented)
            .await
    }

    /// create a spec owned by `parent`, for child objects minted by
    /// controllers
    pub async fn create_child_spec(
        &self,
        key: S::IndexKey,
        spec: S,
        parent: &MetadataContext<C>,
    ) -> Result<SpecWrite, SpecWriteError> {
        self.store
            .put_spec(key, spec, parent.create_child(), None)
            .await
    }

    /// first phase of removal: flag the object so controllers drain it
    pub async fn mark_deleting(&self, key: &S::IndexKey) -> Result<SpecWrite, SpecWriteError> {
        self.store.mark_deleting(key).await
    }
}

#[cfg(test)]
mod test {
    use flotilla_state_model::core::MetadataItem;
    use flotilla_state_model::fixture::TestSpec;

    use super::{SpecWriteError, StoreContext};
    use crate::metadata::ObjMeta;

    type TestStoreContext = StoreContext<TestSpec, ObjMeta>;

    #[tokio::test]
    async fn test_apply_spec_create_then_conflict() {
        let ctx = TestStoreContext::new();

        //given a created object
        let write = ctx
            .apply_spec("web".to_owned(), TestSpec { replicas: 3 }, None)
            .await
            .expect("create");
        assert!(write.created);
        assert_eq!(write.generation, 1);

        //when two writers race from the same generation
        let first = ctx
            .apply_spec("web".to_owned(), TestSpec { replicas: 4 }, Some(1))
            .await
            .expect("first writer");
        assert_eq!(first.generation, 2);

        let second = ctx
            .apply_spec("web".to_owned(), TestSpec { replicas: 5 }, Some(1))
            .await;

        //then exactly one of them is told to re-read
        assert_eq!(
            second,
            Err(SpecWriteError::Conflict {
                presented: Some(1),
                current: 2
            })
        );
        assert_eq!(
            ctx.store().value("web").await.expect("web").spec,
            TestSpec { replicas: 4 }
        );
    }

    #[tokio::test]
    async fn test_create_child_spec_links_owner() {
        let deployments = TestStoreContext::new();
        let instances = TestStoreContext::new();

        deployments
            .apply_spec("web".to_owned(), TestSpec { replicas: 1 }, None)
            .await
            .expect("create parent");
        let parent = deployments
            .store()
            .value("web")
            .await
            .expect("parent")
            .inner_owned();

        instances
            .create_child_spec("web-x1".to_owned(), TestSpec::default(), parent.ctx())
            .await
            .expect("create child");

        let child = instances.store().value("web-x1").await.expect("child");
        assert!(child.is_owned(parent.ctx().item()));
        assert_ne!(child.ctx().item().uid(), parent.ctx().item().uid());
    }

    #[tokio::test]
    async fn test_mark_deleting_flags_object() {
        let ctx = TestStoreContext::new();

        ctx.apply_spec("web".to_owned(), TestSpec { replicas: 1 }, None)
            .await
            .expect("create");

        let write = ctx.mark_deleting(&"web".to_owned()).await.expect("mark");
        assert!(write.changed);
        assert!(
            ctx.store()
                .value("web")
                .await
                .expect("web")
                .is_being_deleted()
        );

        assert_eq!(
            ctx.mark_deleting(&"missing".to_owned()).await,
            Err(SpecWriteError::NotFound)
        );
    }
}

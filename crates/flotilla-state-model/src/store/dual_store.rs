use std::sync::Arc;
use std::fmt::Debug;
use std::fmt::Display;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;
use tracing::{debug, error};
use async_lock::RwLock;
use async_lock::RwLockReadGuard;
use async_lock::RwLockWriteGuard;

use flotilla_types::Generation;

use crate::core::{MetadataContext, MetadataItem, MetadataRevExtension, Spec};

use super::MetadataStoreObject;
use super::{DualEpochMap, DualEpochCounter, Epoch, EpochChanges};
use super::actions::LSUpdate;
use super::event::EventPublisher;

pub use listener::ChangeListener;
pub type MetadataChanges<S, C> = EpochChanges<MetadataStoreObject<S, C>>;

/// Authoritative in-memory record of one resource kind.
///
/// Writes are serialized behind the lock and stamped with store epochs so
/// listeners can drain exactly what changed. Admin spec writes go through
/// [`LocalStore::put_spec`] which enforces generation check-and-set;
/// dispatcher-driven writes use the idempotent [`LocalStore::apply_changes`].
#[derive(Debug)]
pub struct LocalStore<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    store: RwLock<DualEpochMap<S::IndexKey, MetadataStoreObject<S, C>>>,
    event_publisher: Arc<EventPublisher>,
}

impl<S, C> Default for LocalStore<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn default() -> Self {
        Self {
            store: RwLock::new(DualEpochMap::new()),
            event_publisher: EventPublisher::shared(),
        }
    }
}

impl<S, C> LocalStore<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    /// initialize with existing objects
    pub fn bulk_new<N>(objects: Vec<N>) -> Self
    where
        N: Into<MetadataStoreObject<S, C>>,
    {
        let obj: Vec<MetadataStoreObject<S, C>> = objects.into_iter().map(|s| s.into()).collect();
        let mut map = HashMap::new();
        for obj in obj {
            map.insert(obj.key.clone(), obj.into());
        }
        Self {
            store: RwLock::new(DualEpochMap::new_with_map(map)),
            event_publisher: EventPublisher::shared(),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline(always)]
    pub async fn read<'a>(
        &'_ self,
    ) -> RwLockReadGuard<'_, DualEpochMap<S::IndexKey, MetadataStoreObject<S, C>>> {
        self.store.read().await
    }

    /// write guard is private, mutations go through the sync API
    #[inline(always)]
    async fn write<'a>(
        &'_ self,
    ) -> RwLockWriteGuard<'_, DualEpochMap<S::IndexKey, MetadataStoreObject<S, C>>> {
        self.store.write().await
    }

    pub async fn epoch(&self) -> Epoch {
        self.read().await.epoch()
    }

    /// copy of the stored value
    pub async fn value<K: ?Sized>(
        &self,
        key: &K,
    ) -> Option<DualEpochCounter<MetadataStoreObject<S, C>>>
    where
        S::IndexKey: Borrow<K>,
        K: Eq + Hash,
    {
        self.read().await.get(key).cloned()
    }

    pub async fn spec<K: ?Sized>(&self, key: &K) -> Option<S>
    where
        S::IndexKey: Borrow<K>,
        K: Eq + Hash,
    {
        self.read().await.get(key).map(|value| value.spec.clone())
    }

    pub async fn contains_key<K: ?Sized>(&self, key: &K) -> bool
    where
        S::IndexKey: Borrow<K>,
        K: Eq + Hash,
    {
        self.read().await.contains_key(key)
    }

    pub async fn count(&self) -> usize {
        self.read().await.len()
    }

    pub async fn clone_specs(&self) -> Vec<S> {
        self.read()
            .await
            .values()
            .map(|kv| kv.spec.clone())
            .collect()
    }

    pub async fn clone_keys(&self) -> Vec<S::IndexKey> {
        self.read().await.clone_keys()
    }

    pub async fn clone_values(&self) -> Vec<MetadataStoreObject<S, C>> {
        self.read().await.clone_values()
    }

    pub fn event_publisher(&self) -> &EventPublisher {
        &self.event_publisher
    }

    pub fn change_listener(self: &Arc<Self>) -> ChangeListener<S, C> {
        ChangeListener::new(self.clone())
    }

    /// returns once at least one change has been published
    pub async fn wait_for_first_change(self: &Arc<Self>) {
        self.change_listener().listen().await;
    }
}

impl<S, C> Display for LocalStore<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} Store", S::LABEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub epoch: Epoch,
    pub add: i32,
    pub update_spec: i32,
    pub update_status: i32,
    pub update_meta: i32,
    pub delete: i32,
}

impl SyncStatus {
    pub fn has_spec_changes(&self) -> bool {
        self.add > 0 || self.update_spec > 0 || self.delete > 0
    }

    pub fn has_status_changes(&self) -> bool {
        self.update_status > 0
    }
}

/// outcome of a checked spec write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecWrite {
    pub generation: Generation,
    pub created: bool,
    pub changed: bool,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SpecWriteError {
    #[error("stale generation: presented {presented:?}, current {current}")]
    Conflict {
        presented: Option<Generation>,
        current: Generation,
    },
    #[error("object is being deleted")]
    Deleting,
    #[error("object not found")]
    NotFound,
}

impl<S, C> LocalStore<S, C>
where
    S: Spec + PartialEq,
    S::Status: PartialEq,
    S::IndexKey: Display,
    C: MetadataItem + PartialEq,
{
    /// Sync with incoming objects as the source of truth; anything absent
    /// from the incoming list is deleted and history is fenced, so every
    /// listener receives a full view on its next drain. Used for startup
    /// rehydration.
    pub async fn sync_all(&self, incoming_changes: Vec<MetadataStoreObject<S, C>>) -> SyncStatus {
        let (mut add, mut update_spec, mut update_status, mut update_meta, mut delete) =
            (0, 0, 0, 0, 0);

        let mut write_guard = self.write().await;

        debug!(
            "SyncAll: <{}> epoch: {} incoming {}",
            S::LABEL,
            write_guard.epoch(),
            incoming_changes.len()
        );

        let mut local_keys = write_guard.clone_keys();
        // start new epoch cycle
        write_guard.increment_epoch();

        for source in incoming_changes {
            let key = source.key().clone();

            // always insert, so we stamp current epoch
            if let Some(diff) = write_guard.update(key.clone(), source) {
                if diff.spec {
                    update_spec += 1;
                }
                if diff.status {
                    update_status += 1;
                }
                if diff.meta {
                    update_meta += 1;
                }
            } else {
                add += 1;
            }

            local_keys.retain(|n| n != &key);
        }

        // delete entries absent from the incoming set
        for name in local_keys.into_iter() {
            if write_guard.contains_key(&name) {
                if write_guard.remove(&name).is_some() {
                    delete += 1;
                } else {
                    error!("delete should never fail since key exists: {:#?}", name);
                }
            } else {
                error!("kv unexpectedly removed... skipped {:#?}", name);
            }
        }

        write_guard.mark_fence();

        let epoch = write_guard.epoch();

        let status = SyncStatus {
            epoch,
            add,
            update_spec,
            update_status,
            update_meta,
            delete,
        };

        drop(write_guard);

        self.event_publisher.store_change(epoch);

        debug!(
            "Sync all: <{}:{}> [add:{}, mod_spec:{}, mod_status: {}, mod_meta: {}, del:{}]",
            S::LABEL,
            epoch,
            add,
            update_spec,
            update_status,
            update_meta,
            delete,
        );
        status
    }

    /// Apply dispatcher changes. Identical values leave the epoch untouched,
    /// so re-applying the same change is a no-op and nobody is woken.
    pub async fn apply_changes(&self, changes: Vec<LSUpdate<S, C>>) -> Option<SyncStatus> {
        let (mut add, mut update_spec, mut update_status, mut update_meta, mut delete) =
            (0, 0, 0, 0, 0);
        let mut write_guard = self.write().await;
        write_guard.increment_epoch();

        debug!(
            "apply changes <{}> new epoch: {}, incoming: {} items",
            S::LABEL,
            write_guard.epoch(),
            changes.len(),
        );

        for change in changes.into_iter() {
            match change {
                LSUpdate::Mod(new_kv_value) => {
                    let key = new_kv_value.key_owned();
                    if let Some(diff) = write_guard.update(key, new_kv_value) {
                        if diff.spec {
                            update_spec += 1;
                        }
                        if diff.status {
                            update_status += 1;
                        }
                        if diff.meta {
                            update_meta += 1;
                        }
                        trace!(update_spec, update_status, update_meta);
                    } else {
                        trace!("new");
                        add += 1;
                    }
                }
                LSUpdate::Delete(key) => {
                    write_guard.remove(&key);
                    delete += 1;
                }
            }
        }

        // if there are no changes, we revert epoch
        if add == 0 && update_spec == 0 && update_status == 0 && delete == 0 && update_meta == 0 {
            write_guard.decrement_epoch();

            debug!(
                "Apply changes: {} no changes, reverting back epoch to: {}",
                S::LABEL,
                write_guard.epoch()
            );

            return None;
        }

        let epoch = write_guard.epoch();

        let status = SyncStatus {
            epoch,
            add,
            update_spec,
            update_status,
            update_meta,
            delete,
        };

        drop(write_guard);

        debug!("notify epoch changed: {}", epoch);
        self.event_publisher.store_change(epoch);

        debug!(
            "Apply changes {} [add:{},mod_spec:{},mod_status: {},mod_meta: {}, del:{}, epoch: {}]",
            S::LABEL,
            add,
            update_spec,
            update_status,
            update_meta,
            delete,
            epoch,
        );
        Some(status)
    }

    /// Replace the status of an existing object under the write lock. The
    /// spec and its generation are untouched, so a status writer can never
    /// clobber a concurrent checked spec write. Writing an identical status
    /// is a no-op. Status writes are allowed on deleting objects since the
    /// drain itself is reported through status.
    pub async fn put_status(
        &self,
        key: &S::IndexKey,
        status: S::Status,
    ) -> Result<Option<SyncStatus>, SpecWriteError> {
        let mut write_guard = self.write().await;
        write_guard.increment_epoch();

        let current = match write_guard.get(key).map(|c| c.inner().clone()) {
            Some(current) => current,
            None => {
                write_guard.decrement_epoch();
                return Err(SpecWriteError::NotFound);
            }
        };

        if current.status == status {
            write_guard.decrement_epoch();
            return Ok(None);
        }

        let mut next = current;
        next.status = status;
        write_guard.update(key.clone(), next);

        let epoch = write_guard.epoch();
        drop(write_guard);

        self.event_publisher.store_change(epoch);
        debug!(epoch, "put status <{}> {}", S::LABEL, key);

        Ok(Some(SyncStatus {
            epoch,
            add: 0,
            update_spec: 0,
            update_status: 1,
            update_meta: 0,
            delete: 0,
        }))
    }
}

impl<S, C> LocalStore<S, C>
where
    S: Spec + PartialEq,
    S::Status: PartialEq,
    S::IndexKey: Display,
    C: MetadataRevExtension + PartialEq,
{
    /// Checked spec upsert.
    ///
    /// A writer presents the generation it last read (`None` for a blind
    /// upsert); a mismatch against the stored generation fails with
    /// `Conflict` and writes nothing. Re-submitting an identical spec is a
    /// no-op that returns the current generation unchanged. `create_ctx`
    /// supplies identity for a created object and is ignored otherwise.
    pub async fn put_spec(
        &self,
        key: S::IndexKey,
        spec: S,
        create_ctx: MetadataContext<C>,
        presented: Option<Generation>,
    ) -> Result<SpecWrite, SpecWriteError> {
        let mut write_guard = self.write().await;
        write_guard.increment_epoch();

        let current = write_guard.get(&key).map(|c| c.inner().clone());

        let write = match current {
            Some(current) => {
                if current.is_being_deleted() {
                    write_guard.decrement_epoch();
                    return Err(SpecWriteError::Deleting);
                }

                let current_gen = current.ctx().item().generation();
                if let Some(presented_gen) = presented {
                    if presented_gen != current_gen {
                        write_guard.decrement_epoch();
                        return Err(SpecWriteError::Conflict {
                            presented,
                            current: current_gen,
                        });
                    }
                }

                if current.spec == spec {
                    // idempotent re-apply, nothing to record
                    write_guard.decrement_epoch();
                    return Ok(SpecWrite {
                        generation: current_gen,
                        created: false,
                        changed: false,
                    });
                }

                let next_item = current.ctx().item().next_generation();
                let generation = next_item.generation();
                let mut ctx = current.ctx().clone();
                ctx.set_item(next_item);
                let obj = MetadataStoreObject::new(key.clone(), spec, current.status.clone())
                    .with_context(ctx);
                write_guard.update(key, obj);

                SpecWrite {
                    generation,
                    created: false,
                    changed: true,
                }
            }
            None => {
                if presented.is_some() {
                    // the object the writer read no longer exists
                    write_guard.decrement_epoch();
                    return Err(SpecWriteError::NotFound);
                }

                let generation = create_ctx.item().generation();
                let obj = MetadataStoreObject::with_spec(key.clone(), spec)
                    .with_context(create_ctx);
                write_guard.update(key, obj);

                SpecWrite {
                    generation,
                    created: true,
                    changed: true,
                }
            }
        };

        let epoch = write_guard.epoch();
        drop(write_guard);

        self.event_publisher.store_change(epoch);
        debug!(epoch, generation = write.generation, "put spec <{}>", S::LABEL);

        Ok(write)
    }

    /// Mark an object deleting: advances its generation with the deletion
    /// flag set so controllers can drain it before final removal. Marking
    /// twice is a no-op.
    pub async fn mark_deleting(
        &self,
        key: &S::IndexKey,
    ) -> Result<SpecWrite, SpecWriteError> {
        let mut write_guard = self.write().await;
        write_guard.increment_epoch();

        let current = match write_guard.get(key).map(|c| c.inner().clone()) {
            Some(current) => current,
            None => {
                write_guard.decrement_epoch();
                return Err(SpecWriteError::NotFound);
            }
        };

        if current.is_being_deleted() {
            write_guard.decrement_epoch();
            return Ok(SpecWrite {
                generation: current.ctx().item().generation(),
                created: false,
                changed: false,
            });
        }

        let deleting_item = current.ctx().item().deleting();
        let generation = deleting_item.generation();
        let mut ctx = current.ctx().clone();
        ctx.set_item(deleting_item);
        let obj =
            MetadataStoreObject::new(key.clone(), current.spec.clone(), current.status.clone())
                .with_context(ctx);
        write_guard.update(key.clone(), obj);

        let epoch = write_guard.epoch();
        drop(write_guard);

        self.event_publisher.store_change(epoch);
        debug!(epoch, "marked deleting <{}> {}", S::LABEL, key);

        Ok(SpecWrite {
            generation,
            created: false,
            changed: true,
        })
    }
}

mod listener {

    use std::fmt;
    use std::sync::Arc;

    use tracing::{trace, debug, instrument};

    use crate::store::event::EventPublisher;
    use crate::store::{
        ChangeFlag, FULL_FILTER, META_FILTER, MetadataStoreObject, SPEC_FILTER, STATUS_FILTER,
    };

    use super::{LocalStore, Spec, MetadataItem, MetadataChanges};

    /// Level-triggered view over one store. Tracks the last drained epoch;
    /// `listen` parks until the store moves past it.
    pub struct ChangeListener<S, C>
    where
        S: Spec,
        C: MetadataItem,
    {
        store: Arc<LocalStore<S, C>>,
        last_change: i64,
    }

    impl<S, C> fmt::Debug for ChangeListener<S, C>
    where
        S: Spec,
        C: MetadataItem,
    {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(
                f,
                "{} last:{},current:{}",
                S::LABEL,
                self.last_change,
                self.event_publisher().current_change()
            )
        }
    }

    impl<S, C> ChangeListener<S, C>
    where
        S: Spec,
        C: MetadataItem,
    {
        pub fn new(store: Arc<LocalStore<S, C>>) -> Self {
            Self {
                store,
                last_change: 0,
            }
        }

        #[inline]
        fn event_publisher(&self) -> &EventPublisher {
            self.store.event_publisher()
        }

        /// must be checked before registering the listener so no event is
        /// missed between the check and the wait
        #[inline]
        pub fn has_change(&self) -> bool {
            self.event_publisher().current_change() > self.last_change
        }

        #[inline(always)]
        pub fn load_last(&mut self) {
            self.set_last_change(self.event_publisher().current_change());
        }

        #[inline(always)]
        pub fn set_last_change(&mut self, updated_change: i64) {
            self.last_change = updated_change;
        }

        #[inline]
        pub fn last_change(&self) -> i64 {
            self.last_change
        }

        pub fn current_change(&self) -> i64 {
            self.event_publisher().current_change()
        }

        pub async fn listen(&self) {
            if self.has_change() {
                trace!("before has change: {}", self.last_change());
                return;
            }

            let listener = self.event_publisher().listen();

            if self.has_change() {
                trace!("after has change: {}", self.last_change());
                return;
            }

            trace!("waiting for publisher");

            listener.await;

            trace!("new change: {}", self.current_change());
        }

        pub async fn sync_changes(&mut self) -> MetadataChanges<S, C> {
            self.sync_changes_with_filter(&FULL_FILTER).await
        }

        pub async fn sync_spec_changes(&mut self) -> MetadataChanges<S, C> {
            self.sync_changes_with_filter(&SPEC_FILTER).await
        }

        pub async fn sync_status_changes(&mut self) -> MetadataChanges<S, C> {
            self.sync_changes_with_filter(&STATUS_FILTER).await
        }

        pub async fn sync_meta_changes(&mut self) -> MetadataChanges<S, C> {
            self.sync_changes_with_filter(&META_FILTER).await
        }

        pub async fn sync_changes_with_filter(
            &mut self,
            filter: &ChangeFlag,
        ) -> MetadataChanges<S, C> {
            let read_guard = self.store.read().await;
            let changes = read_guard.changes_since_with_filter(self.last_change, filter);
            drop(read_guard);
            trace!(
                "finding last change: {}, from: {}",
                self.last_change, changes.epoch
            );

            self.set_last_change(changes.epoch);
            changes
        }

        /// wait for the first (rehydration) sync and return the full view
        #[instrument()]
        pub async fn wait_for_initial_sync(&mut self) -> Vec<MetadataStoreObject<S, C>> {
            debug!("waiting");
            self.listen().await;

            let changes = self.sync_changes().await;
            assert!(changes.is_sync_all());

            debug!("finished initial sync");
            changes.parts().0
        }
    }
}

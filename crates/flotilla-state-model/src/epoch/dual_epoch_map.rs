use std::ops::Deref;
use std::ops::DerefMut;
use std::hash::Hash;
use std::cmp::Eq;
use std::collections::HashMap;
use std::borrow::Borrow;

use once_cell::sync::Lazy;
use tracing::trace;

use super::EpochCounter;
use super::Epoch;
use super::EpochDeltaChanges;
use super::EpochChanges;

/// compute which parts of an object changed against a newer value
pub trait DualDiff {
    fn diff(&self, new_value: &Self) -> ChangeFlag;
}

pub static FULL_FILTER: Lazy<ChangeFlag> = Lazy::new(ChangeFlag::all);

pub static SPEC_FILTER: Lazy<ChangeFlag> = Lazy::new(|| ChangeFlag {
    spec: true,
    status: false,
    meta: false,
});

pub static STATUS_FILTER: Lazy<ChangeFlag> = Lazy::new(|| ChangeFlag {
    spec: false,
    status: true,
    meta: false,
});

pub static META_FILTER: Lazy<ChangeFlag> = Lazy::new(|| ChangeFlag {
    spec: false,
    status: false,
    meta: true,
});

/// which of the three tracked facets changed
#[derive(Debug)]
pub struct ChangeFlag {
    pub spec: bool,
    pub status: bool,
    pub meta: bool,
}

impl ChangeFlag {
    pub fn all() -> Self {
        Self {
            spec: true,
            status: true,
            meta: true,
        }
    }

    #[inline]
    pub fn no_change() -> Self {
        Self {
            spec: false,
            status: false,
            meta: false,
        }
    }

    #[inline]
    pub fn has_full_change(&self) -> bool {
        self.spec && self.status && self.meta
    }

    #[inline]
    pub fn has_no_changes(&self) -> bool {
        !self.spec && !self.status && !self.meta
    }
}

/// Object wrapper stamping separate epochs for spec, status and metadata
/// changes, so listeners can ask for just the facet they reconcile on.
#[derive(Debug, Default, Clone)]
pub struct DualEpochCounter<T> {
    spec_epoch: Epoch,
    status_epoch: Epoch,
    meta_epoch: Epoch,
    inner: T,
}

impl<T> DualEpochCounter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            spec_epoch: 0,
            status_epoch: 0,
            meta_epoch: 0,
            inner,
        }
    }

    fn set_epoch(&mut self, epoch: Epoch) {
        self.spec_epoch = epoch;
        self.status_epoch = epoch;
        self.meta_epoch = epoch;
    }

    fn copy_epoch(&mut self, old: &Self) {
        self.spec_epoch = old.spec_epoch;
        self.status_epoch = old.status_epoch;
        self.meta_epoch = old.meta_epoch;
    }

    #[inline]
    pub fn spec_epoch(&self) -> Epoch {
        self.spec_epoch
    }

    fn set_spec_epoch(&mut self, epoch: Epoch) {
        self.spec_epoch = epoch;
    }

    #[inline]
    pub fn status_epoch(&self) -> Epoch {
        self.status_epoch
    }

    fn set_status_epoch(&mut self, epoch: Epoch) {
        self.status_epoch = epoch;
    }

    #[inline]
    pub fn meta_epoch(&self) -> Epoch {
        self.meta_epoch
    }

    fn set_meta_epoch(&mut self, epoch: Epoch) {
        self.meta_epoch = epoch;
    }

    #[inline]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn inner_owned(self) -> T {
        self.inner
    }
}

impl<T> Deref for DualEpochCounter<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for DualEpochCounter<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T> From<T> for DualEpochCounter<T> {
    fn from(inner: T) -> Self {
        Self::new(inner)
    }
}

/// Map of objects with per-facet epoch stamps plus a deletion history.
/// The fence marks the oldest epoch the history can answer for; listeners
/// behind the fence get a full resync instead of a delta.
#[derive(Debug, Default)]
pub struct DualEpochMap<K, V> {
    epoch: EpochCounter<()>,
    fence: EpochCounter<()>,
    values: HashMap<K, DualEpochCounter<V>>,
    deleted: Vec<DualEpochCounter<V>>,
}

impl<K, V> Deref for DualEpochMap<K, V> {
    type Target = HashMap<K, DualEpochCounter<V>>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl<K, V> DerefMut for DualEpochMap<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl<K, V> DualEpochMap<K, V> {
    pub fn increment_epoch(&mut self) {
        self.epoch.increment();
    }

    pub fn decrement_epoch(&mut self) {
        self.epoch.decrement();
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch.epoch()
    }
}

impl<K, V> DualEpochMap<K, V>
where
    V: DualDiff,
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::new_with_map(HashMap::new())
    }

    pub fn new_with_map(values: HashMap<K, DualEpochCounter<V>>) -> Self {
        Self {
            epoch: EpochCounter::default(),
            fence: EpochCounter::default(),
            values,
            deleted: vec![],
        }
    }

    /// Insert or replace, stamping the changed facets with the current
    /// epoch. Returns the diff against the existing value, or `None` when
    /// the key was absent (everything is new).
    pub fn update(&mut self, key: K, new_value: V) -> Option<ChangeFlag>
    where
        K: Clone,
    {
        let mut new_value = DualEpochCounter::new(new_value);
        let current_epoch = self.epoch.epoch();

        trace!(current_epoch, "updating");

        if let Some(existing_value) = self.values.get_mut(&key) {
            let diff = existing_value.diff(new_value.inner());
            trace!("existing diff: {:#?}", diff);
            if !diff.has_no_changes() {
                new_value.copy_epoch(existing_value);
                if diff.spec {
                    new_value.set_spec_epoch(current_epoch);
                }
                if diff.status {
                    new_value.set_status_epoch(current_epoch);
                }
                if diff.meta {
                    new_value.set_meta_epoch(current_epoch);
                }

                *existing_value = new_value;
            }

            Some(diff)
        } else {
            new_value.set_epoch(current_epoch);
            self.values.insert(key, new_value);
            None
        }
    }

    /// remove a value; the removal is stamped and retained in history
    pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<DualEpochCounter<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        V: Clone,
    {
        if let Some((_, mut old_value)) = self.values.remove_entry(k) {
            old_value.set_epoch(self.epoch.epoch());
            self.deleted.push(old_value.clone());
            Some(old_value)
        } else {
            None
        }
    }

    /// drop history older than the current epoch
    pub fn mark_fence(&mut self) {
        self.deleted = vec![];
        self.fence = self.epoch.clone();
    }
}

impl<K, V> DualEpochMap<K, V>
where
    K: Clone,
{
    pub fn clone_keys(&self) -> Vec<K> {
        self.keys().cloned().collect()
    }
}

impl<K, V> DualEpochMap<K, V>
where
    V: Clone,
    K: Clone,
{
    pub fn clone_values(&self) -> Vec<V> {
        self.values().cloned().map(|c| c.inner_owned()).collect()
    }

    pub fn spec_changes_since<E>(&self, epoch_value: E) -> EpochChanges<V>
    where
        Epoch: From<E>,
    {
        let epoch = epoch_value.into();
        self.changes_since_with_filter(epoch, &SPEC_FILTER)
    }

    pub fn status_changes_since<E>(&self, epoch_value: E) -> EpochChanges<V>
    where
        Epoch: From<E>,
    {
        let epoch = epoch_value.into();
        self.changes_since_with_filter(epoch, &STATUS_FILTER)
    }

    pub fn meta_changes_since<E>(&self, epoch_value: E) -> EpochChanges<V>
    where
        Epoch: From<E>,
    {
        let epoch = epoch_value.into();
        self.changes_since_with_filter(epoch, &META_FILTER)
    }

    pub fn changes_since<E>(&self, epoch_value: E) -> EpochChanges<V>
    where
        Epoch: From<E>,
    {
        let epoch = epoch_value.into();

        self.changes_since_with_filter(epoch, &FULL_FILTER)
    }

    /// Changes after `epoch` restricted to the filtered facets. An epoch
    /// behind the fence returns the full current view; the current epoch
    /// returns an empty delta.
    pub fn changes_since_with_filter(&self, epoch: Epoch, filter: &ChangeFlag) -> EpochChanges<V> {
        if epoch < self.fence.epoch() {
            return EpochChanges::new(
                self.epoch.epoch(),
                EpochDeltaChanges::SyncAll(self.clone_values()),
            );
        }

        if epoch == self.epoch() {
            return EpochChanges::new(self.epoch.epoch(), EpochDeltaChanges::empty());
        }

        let updates: Vec<V> = self
            .values()
            .filter_map(|v| {
                if filter.spec && v.spec_epoch > epoch
                    || filter.status && v.status_epoch > epoch
                    || filter.meta && v.meta_epoch > epoch
                {
                    Some(v.inner().clone())
                } else {
                    None
                }
            })
            .collect();

        let deletes = self
            .deleted
            .iter()
            .filter_map(|v| {
                if filter.spec && v.spec_epoch > epoch
                    || filter.status && v.status_epoch > epoch
                    || filter.meta && v.meta_epoch > epoch
                {
                    Some(v.inner().clone())
                } else {
                    None
                }
            })
            .collect();

        EpochChanges::new(
            self.epoch.epoch(),
            EpochDeltaChanges::Changes((updates, deletes)),
        )
    }
}

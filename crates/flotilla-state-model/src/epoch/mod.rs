mod dual_epoch_map;

pub use dual_epoch_map::*;

use std::ops::{Deref, DerefMut};

/// monotone store change counter
pub type Epoch = i64;

/// value stamped with the store epoch at which it last changed
#[derive(Debug, Default, Clone)]
pub struct EpochCounter<T> {
    epoch: Epoch,
    inner: T,
}

impl<T> Deref for EpochCounter<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for EpochCounter<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T> EpochCounter<T> {
    pub fn new(inner: T) -> Self {
        Self { epoch: 0, inner }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn set_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
    }

    pub fn increment(&mut self) {
        self.epoch += 1;
    }

    pub fn decrement(&mut self) {
        self.epoch -= 1;
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_owned(self) -> T {
        self.inner
    }
}

/// changes returned to a listener: either the full current view (the
/// listener's epoch predates retained history) or the delta since it
#[derive(Debug)]
pub struct EpochChanges<V> {
    pub epoch: Epoch,
    changes: EpochDeltaChanges<V>,
}

impl<V> EpochChanges<V> {
    pub fn new(epoch: Epoch, changes: EpochDeltaChanges<V>) -> Self {
        Self { epoch, changes }
    }

    pub fn current_epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn is_sync_all(&self) -> bool {
        matches!(&self.changes, EpochDeltaChanges::SyncAll(_))
    }

    pub fn is_empty(&self) -> bool {
        match &self.changes {
            EpochDeltaChanges::SyncAll(all) => all.is_empty(),
            EpochDeltaChanges::Changes((updates, deletes)) => {
                updates.is_empty() && deletes.is_empty()
            }
        }
    }

    /// (updates, deletes); a sync-all has no deletes
    pub fn parts(self) -> (Vec<V>, Vec<V>) {
        match self.changes {
            EpochDeltaChanges::SyncAll(all) => (all, vec![]),
            EpochDeltaChanges::Changes(changes) => changes,
        }
    }
}

#[derive(Debug)]
pub enum EpochDeltaChanges<V> {
    SyncAll(Vec<V>),
    Changes((Vec<V>, Vec<V>)),
}

impl<V> EpochDeltaChanges<V> {
    pub fn empty() -> Self {
        Self::Changes((vec![], vec![]))
    }
}

use std::fmt::Debug;
use std::hash::Hash;

use flotilla_types::Generation;

/// Desired state for a managed resource kind.
///
/// Every kind the control plane manages implements this once. The index key
/// identifies one object inside the kind's store; `Owner` names the kind
/// whose objects may own objects of this kind (self-owned kinds point at
/// themselves).
pub trait Spec: Default + Debug + Clone + PartialEq + Send + Sync + 'static {
    const LABEL: &'static str;

    type IndexKey: Debug + Eq + Hash + Clone + ToString + Send + Sync;
    type Status: Status;
    type Owner: Spec;
}

/// Observed state paired with a [`Spec`]. Written only by controllers.
pub trait Status: Default + Debug + Clone + PartialEq + Send + Sync + 'static {}

/// Store bookkeeping carried next to every object: identity, the spec
/// generation used for optimistic concurrency, and the deletion mark.
pub trait MetadataItem: Clone + Default + Debug + PartialEq + Send + Sync + 'static {
    type UId: PartialEq + Debug;

    /// identity that survives generation bumps
    fn uid(&self) -> &Self::UId;

    /// spec change counter, presented back by writers as the CAS token
    fn generation(&self) -> Generation;

    /// true if this item should replace `another` during a sync
    fn is_newer(&self, another: &Self) -> bool;

    /// deletion requested, object is draining before final removal
    fn is_being_deleted(&self) -> bool {
        false
    }
}

/// Items that can mint their successors. Required by the spec write path.
pub trait MetadataRevExtension: MetadataItem {
    /// successor with the generation advanced
    fn next_generation(&self) -> Self;

    /// successor with the generation advanced and the deletion mark set
    fn deleting(&self) -> Self;
}

/// Ownership context stored with every object. A child object created by a
/// controller carries its parent's item so owner identity can be checked
/// without a store lookup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetadataContext<C> {
    item: C,
    owner: Option<C>,
}

impl<C> From<C> for MetadataContext<C> {
    fn from(item: C) -> Self {
        Self { item, owner: None }
    }
}

impl<C> MetadataContext<C> {
    pub fn new(item: C, owner: Option<C>) -> Self {
        Self { item, owner }
    }

    pub fn item(&self) -> &C {
        &self.item
    }

    pub fn item_mut(&mut self) -> &mut C {
        &mut self.item
    }

    pub fn item_owned(self) -> C {
        self.item
    }

    pub fn set_item(&mut self, item: C) {
        self.item = item;
    }

    pub fn owner(&self) -> Option<&C> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: C) {
        self.owner = Some(owner);
    }
}

impl<C> MetadataContext<C>
where
    C: MetadataItem,
{
    /// context for an object owned by the holder of this context
    pub fn create_child(&self) -> Self {
        Self {
            item: C::default(),
            owner: Some(self.item.clone()),
        }
    }

    /// does the owner item match the given parent item by uid
    pub fn is_owned_by(&self, parent: &C) -> bool {
        self.owner
            .as_ref()
            .map(|owner| owner.uid() == parent.uid())
            .unwrap_or(false)
    }
}

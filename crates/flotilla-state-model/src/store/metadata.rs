use std::fmt;

use crate::core::{MetadataContext, MetadataItem, MetadataRevExtension, Spec};
use crate::epoch::{ChangeFlag, DualDiff};

/// One stored object: key, desired spec, observed status and the store
/// bookkeeping context.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataStoreObject<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    pub key: S::IndexKey,
    pub spec: S,
    pub status: S::Status,
    pub ctx: MetadataContext<C>,
}

impl<S, C> MetadataStoreObject<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    pub fn new<K>(key: K, spec: S, status: S::Status) -> Self
    where
        K: Into<S::IndexKey>,
    {
        Self {
            key: key.into(),
            spec,
            status,
            ctx: MetadataContext::default(),
        }
    }

    pub fn with_spec<K>(key: K, spec: S) -> Self
    where
        K: Into<S::IndexKey>,
    {
        Self::new(key.into(), spec, S::Status::default())
    }

    pub fn with_key<K>(key: K) -> Self
    where
        K: Into<S::IndexKey>,
    {
        Self::new(key.into(), S::default(), S::Status::default())
    }

    pub fn with_context<J>(mut self, ctx: J) -> Self
    where
        J: Into<MetadataContext<C>>,
    {
        self.ctx = ctx.into();
        self
    }

    pub fn key(&self) -> &S::IndexKey {
        &self.key
    }

    pub fn key_owned(&self) -> S::IndexKey {
        self.key.clone()
    }

    pub fn ctx(&self) -> &MetadataContext<C> {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut MetadataContext<C> {
        &mut self.ctx
    }

    pub fn ctx_owned(self) -> MetadataContext<C> {
        self.ctx
    }

    pub fn set_ctx(&mut self, ctx: MetadataContext<C>) {
        self.ctx = ctx;
    }

    pub fn is_being_deleted(&self) -> bool {
        self.ctx.item().is_being_deleted()
    }

    /// does this object belong to the given parent item
    pub fn is_owned(&self, parent: &C) -> bool {
        self.ctx.is_owned_by(parent)
    }
}

impl<S, C> MetadataStoreObject<S, C>
where
    S: Spec,
    C: MetadataRevExtension,
{
    /// same object with the metadata generation advanced
    pub fn next_generation(mut self) -> Self {
        let next = self.ctx.item().next_generation();
        self.ctx.set_item(next);
        self
    }
}

impl<S, C> fmt::Display for MetadataStoreObject<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", S::LABEL, self.key.to_string())
    }
}

impl<S, C> DualDiff for MetadataStoreObject<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn diff(&self, new_value: &Self) -> ChangeFlag {
        ChangeFlag {
            spec: self.spec != new_value.spec,
            status: self.status != new_value.status,
            // metadata counts only when the incoming item is strictly newer
            meta: !self.ctx.item().is_newer(new_value.ctx.item()),
        }
    }
}

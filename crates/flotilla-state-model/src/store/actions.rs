use std::fmt;

use crate::core::{MetadataItem, Spec};

use super::MetadataStoreObject;

/// change fed into a local store by a dispatcher
#[derive(Debug, PartialEq, Clone)]
pub enum LSUpdate<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    Mod(MetadataStoreObject<S, C>),
    Delete(S::IndexKey),
}

impl<S, C> fmt::Display for LSUpdate<S, C>
where
    S: Spec,
    C: MetadataItem,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LSUpdate::Mod(obj) => write!(f, "mod {}", obj.key.to_string()),
            LSUpdate::Delete(key) => write!(f, "del {}", key.to_string()),
        }
    }
}

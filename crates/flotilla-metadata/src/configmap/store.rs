//!
//! # ConfigMap Store
//!

use std::sync::Arc;

use crate::store::*;

use super::*;

pub type SharedConfigMapStore<C> = Arc<ConfigMapLocalStore<C>>;

pub type ConfigMapMetadata<C> = MetadataStoreObject<ConfigMapSpec, C>;
pub type ConfigMapLocalStore<C> = LocalStore<ConfigMapSpec, C>;

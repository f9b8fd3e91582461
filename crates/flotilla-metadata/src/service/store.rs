//!
//! # Service Store
//!

use std::sync::Arc;

use crate::store::*;

use super::*;

pub type SharedServiceStore<C> = Arc<ServiceLocalStore<C>>;

pub type ServiceMetadata<C> = MetadataStoreObject<ServiceSpec, C>;
pub type ServiceLocalStore<C> = LocalStore<ServiceSpec, C>;

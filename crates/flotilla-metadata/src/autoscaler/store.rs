//!
//! # Autoscaler Store
//!

use std::sync::Arc;

use crate::store::*;

use super::*;

pub type SharedAutoscalerStore<C> = Arc<AutoscalerLocalStore<C>>;

pub type AutoscalerMetadata<C> = MetadataStoreObject<AutoscalerSpec, C>;
pub type AutoscalerLocalStore<C> = LocalStore<AutoscalerSpec, C>;

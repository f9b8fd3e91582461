//!
//! # Volume Claim Store
//!

use std::sync::Arc;

use crate::store::*;

use super::*;

pub type SharedVolumeStore<C> = Arc<VolumeLocalStore<C>>;

pub type VolumeMetadata<C> = MetadataStoreObject<VolumeSpec, C>;
pub type VolumeLocalStore<C> = LocalStore<VolumeSpec, C>;

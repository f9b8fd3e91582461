//!
//! # Secret Store
//!

use std::sync::Arc;

use crate::store::*;

use super::*;

pub type SharedSecretStore<C> = Arc<SecretLocalStore<C>>;

pub type SecretMetadata<C> = MetadataStoreObject<SecretSpec, C>;
pub type SecretLocalStore<C> = LocalStore<SecretSpec, C>;

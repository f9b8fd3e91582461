//!
//! # Local object metadata
//!
//! Bookkeeping carried by every locally-owned object: a random uid minted
//! at creation, the spec generation used as the optimistic-concurrency
//! token, and the deletion mark for two-phase removal.

mod local;

pub use local::*;

use serde::{Deserialize, Serialize};

use flotilla_state_model::core::{MetadataItem, MetadataRevExtension};
use flotilla_types::Generation;

const UID_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjMeta {
    uid: String,
    generation: Generation,
    #[serde(default)]
    deleted: bool,
}

impl ObjMeta {
    /// fresh identity starting at generation 1
    pub fn new() -> Self {
        Self {
            uid: random_uid(),
            generation: 1,
            deleted: false,
        }
    }
}

/// Mints a fresh identity, so contexts built through
/// [`MetadataContext::create_child`] start distinct.
///
/// [`MetadataContext::create_child`]: flotilla_state_model::core::MetadataContext::create_child
impl Default for ObjMeta {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataItem for ObjMeta {
    type UId = String;

    fn uid(&self) -> &Self::UId {
        &self.uid
    }

    fn generation(&self) -> Generation {
        self.generation
    }

    fn is_newer(&self, another: &Self) -> bool {
        self.generation >= another.generation
    }

    fn is_being_deleted(&self) -> bool {
        self.deleted
    }
}

impl MetadataRevExtension for ObjMeta {
    fn next_generation(&self) -> Self {
        Self {
            uid: self.uid.clone(),
            generation: self.generation + 1,
            deleted: self.deleted,
        }
    }

    fn deleting(&self) -> Self {
        Self {
            uid: self.uid.clone(),
            generation: self.generation + 1,
            deleted: true,
        }
    }
}

fn random_uid() -> String {
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .take(UID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod test {
    use flotilla_state_model::core::{MetadataItem, MetadataRevExtension};

    use super::ObjMeta;

    #[test]
    fn test_fresh_identities_are_distinct() {
        let first = ObjMeta::new();
        let second = ObjMeta::new();

        assert_ne!(first.uid(), second.uid());
        assert_eq!(first.generation(), 1);
        assert!(!first.is_being_deleted());
    }

    #[test]
    fn test_generation_advances_keep_identity() {
        let meta = ObjMeta::new();

        let next = meta.next_generation();
        assert_eq!(next.uid(), meta.uid());
        assert_eq!(next.generation(), 2);
        assert!(!next.is_being_deleted());
        assert!(next.is_newer(&meta));

        let deleting = next.deleting();
        assert_eq!(deleting.uid(), meta.uid());
        assert_eq!(deleting.generation(), 3);
        assert!(deleting.is_being_deleted());
    }

    #[test]
    fn test_deleted_defaults_to_false_on_parse() {
        //given a document written before the object was ever marked
        let doc = "uid: a1b2c3d4\ngeneration: 4\n";

        //when
        let parsed: ObjMeta = serde_yaml::from_str(doc).expect("parse");

        //then
        assert_eq!(parsed.uid(), "a1b2c3d4");
        assert_eq!(parsed.generation(), 4);
        assert!(!parsed.is_being_deleted());
    }
}

pub mod core;
pub mod epoch;
pub mod store;

pub use async_lock;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture {

    use flotilla_types::Generation;

    use crate::core::{MetadataContext, MetadataItem, MetadataRevExtension, Spec, Status};
    use crate::epoch::DualEpochMap;
    use crate::store::MetadataStoreObject;

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct TestSpec {
        pub replicas: u16,
    }

    impl Spec for TestSpec {
        const LABEL: &'static str = "Test";
        type IndexKey = String;
        type Status = TestStatus;
        type Owner = Self;
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct TestStatus {
        pub ready: u16,
    }

    impl Status for TestStatus {}

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct TestMeta {
        pub generation: Generation,
        pub deleted: bool,
    }

    impl TestMeta {
        pub fn new(generation: Generation) -> Self {
            Self {
                generation,
                deleted: false,
            }
        }
    }

    impl MetadataItem for TestMeta {
        type UId = Generation;

        fn uid(&self) -> &Self::UId {
            &self.generation
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

    impl MetadataRevExtension for TestMeta {
        fn next_generation(&self) -> Self {
            Self {
                generation: self.generation + 1,
                deleted: self.deleted,
            }
        }

        fn deleting(&self) -> Self {
            Self {
                generation: self.generation + 1,
                deleted: true,
            }
        }
    }

    impl From<Generation> for MetadataContext<TestMeta> {
        fn from(generation: Generation) -> Self {
            TestMeta::new(generation).into()
        }
    }

    pub type DefaultTest = MetadataStoreObject<TestSpec, TestMeta>;
    pub type TestEpochMap = DualEpochMap<String, DefaultTest>;
}

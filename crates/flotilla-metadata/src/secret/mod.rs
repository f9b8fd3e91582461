mod spec;

pub mod store;

pub use self::spec::*;

mod metadata {

    use crate::core::{Spec, Status};
    use crate::extended::{ObjectType, SpecExt};
    use crate::key::ObjectKey;

    use super::*;

    impl Spec for SecretSpec {
        const LABEL: &'static str = "Secret";

        type IndexKey = ObjectKey;
        type Status = SecretStatus;
        type Owner = Self;
    }

    impl SpecExt for SecretSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::Secret;
    }

    impl Status for SecretStatus {}
}

mod spec;

pub mod store;

pub use self::spec::*;

mod metadata {

    use crate::core::{Spec, Status};
    use crate::extended::{ObjectType, SpecExt};
    use crate::key::ObjectKey;

    use super::*;

    impl Spec for ConfigMapSpec {
        const LABEL: &'static str = "ConfigMap";

        type IndexKey = ObjectKey;
        type Status = ConfigMapStatus;
        type Owner = Self;
    }

    impl SpecExt for ConfigMapSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::ConfigMap;
    }

    impl Status for ConfigMapStatus {}
}

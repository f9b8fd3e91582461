mod spec;
mod status;

pub mod store;

pub use self::spec::*;
pub use self::status::*;

mod metadata {

    use crate::core::{Spec, Status};
    use crate::extended::{ObjectType, SpecExt};
    use crate::key::ObjectKey;

    use super::*;

    impl Spec for ServiceSpec {
        const LABEL: &'static str = "Service";

        type IndexKey = ObjectKey;
        type Status = ServiceStatus;
        type Owner = Self;
    }

    impl SpecExt for ServiceSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::Service;
    }

    impl Status for ServiceStatus {}
}

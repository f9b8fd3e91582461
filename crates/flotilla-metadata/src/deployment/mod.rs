mod spec;
mod status;

pub mod store;

pub use self::spec::*;
pub use self::status::*;
pub use self::store::*;

mod metadata {

    use crate::core::{Spec, Status};
    use crate::extended::{ObjectType, SpecExt};
    use crate::key::ObjectKey;

    use super::*;

    impl Spec for DeploymentSpec {
        const LABEL: &'static str = "Deployment";

        type IndexKey = ObjectKey;
        type Status = DeploymentStatus;
        type Owner = Self;
    }

    impl SpecExt for DeploymentSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::Deployment;
    }

    impl Status for DeploymentStatus {}
}

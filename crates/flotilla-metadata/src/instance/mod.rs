mod spec;
mod status;

pub mod store;

pub use self::spec::*;
pub use self::status::*;
pub use self::store::*;

mod metadata {

    use crate::core::{Spec, Status};
    use crate::deployment::DeploymentSpec;
    use crate::extended::{ObjectType, SpecExt};
    use crate::key::ObjectKey;

    use super::*;

    impl Spec for InstanceSpec {
        const LABEL: &'static str = "Instance";

        type IndexKey = ObjectKey;
        type Status = InstanceStatus;
        type Owner = DeploymentSpec;
    }

    impl SpecExt for InstanceSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::Instance;
    }

    impl Status for InstanceStatus {}
}

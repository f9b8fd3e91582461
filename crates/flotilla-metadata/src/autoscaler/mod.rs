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

    impl Spec for AutoscalerSpec {
        const LABEL: &'static str = "Autoscaler";

        type IndexKey = ObjectKey;
        type Status = AutoscalerStatus;
        type Owner = Self;
    }

    impl SpecExt for AutoscalerSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::Autoscaler;
    }

    impl Status for AutoscalerStatus {}
}

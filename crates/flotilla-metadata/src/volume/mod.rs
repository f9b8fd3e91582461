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

    impl Spec for VolumeSpec {
        const LABEL: &'static str = "Volume";

        type IndexKey = ObjectKey;
        type Status = VolumeStatus;
        type Owner = Self;
    }

    impl SpecExt for VolumeSpec {
        const OBJECT_TYPE: ObjectType = ObjectType::Volume;
    }

    impl Status for VolumeStatus {}
}

pub mod key;
pub mod labels;
pub mod condition;
pub mod template;

pub mod deployment;
pub mod instance;
pub mod service;
pub mod configmap;
pub mod secret;
pub mod volume;
pub mod autoscaler;

pub use flotilla_state_model::core;

pub mod store {
    pub use flotilla_state_model::store::*;
}

pub mod extended {

    use std::fmt;

    use super::core::Spec;

    /// runtime tag for the managed resource kinds
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub enum ObjectType {
        Deployment,
        Service,
        ConfigMap,
        Secret,
        Volume,
        Autoscaler,
        Instance,
    }

    impl fmt::Display for ObjectType {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self {
                Self::Deployment => write!(f, "Deployment"),
                Self::Service => write!(f, "Service"),
                Self::ConfigMap => write!(f, "ConfigMap"),
                Self::Secret => write!(f, "Secret"),
                Self::Volume => write!(f, "Volume"),
                Self::Autoscaler => write!(f, "Autoscaler"),
                Self::Instance => write!(f, "Instance"),
            }
        }
    }

    pub trait SpecExt: Spec {
        const OBJECT_TYPE: ObjectType;
    }
}

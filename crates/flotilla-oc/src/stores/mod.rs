pub mod deployment {
    pub use flotilla_metadata::deployment::*;
}
pub mod instance {
    pub use flotilla_metadata::instance::*;
}
pub mod service {
    pub use flotilla_metadata::service::*;
}
pub mod configmap {
    pub use flotilla_metadata::configmap::*;
}
pub mod secret {
    pub use flotilla_metadata::secret::*;
}
pub mod volume {
    pub use flotilla_metadata::volume::*;
}
pub mod autoscaler {
    pub use flotilla_metadata::autoscaler::*;
}

pub use crate::dispatcher::store::*;

pub mod actions {
    pub use crate::dispatcher::actions::*;
}

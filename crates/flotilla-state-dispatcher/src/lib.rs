pub mod store;
pub mod dispatcher;
pub mod actions;
pub mod metadata;

pub mod core {
    pub use flotilla_state_model::core::*;
}

mod metadata;
mod dual_store;

pub mod actions;
pub mod event;

pub use metadata::*;
pub use dual_store::*;
pub use crate::epoch::*;

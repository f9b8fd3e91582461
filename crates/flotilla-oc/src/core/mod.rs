mod context;

pub mod events;
pub mod metrics;

pub use context::*;

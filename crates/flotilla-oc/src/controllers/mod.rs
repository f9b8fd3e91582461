pub mod autoscalers;
pub mod deployments;
pub mod health;
pub mod instances;
pub mod services;
pub mod volumes;

mod backoff;

pub use backoff::create_backoff;

mod controller;
mod probe;

pub use controller::HealthSupervisor;

mod controller;

pub use controller::InstanceController;

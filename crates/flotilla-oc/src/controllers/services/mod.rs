mod controller;

pub use controller::ServiceController;

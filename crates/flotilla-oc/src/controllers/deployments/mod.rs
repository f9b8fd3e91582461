mod controller;
mod reducer;

pub use controller::DeploymentController;

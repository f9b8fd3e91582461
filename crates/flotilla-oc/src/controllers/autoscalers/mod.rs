mod controller;

pub use controller::AutoscalerController;

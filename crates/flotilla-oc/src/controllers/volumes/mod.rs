mod controller;

pub use controller::VolumeController;

pub mod admin;

pub use admin::{ObjectSpec, ObjectState, ObjectView, OcAdmin};

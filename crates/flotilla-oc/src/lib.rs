pub mod cli;
pub mod config;
pub mod core;
pub mod start;

pub mod stores;
pub mod runtime;
pub mod services;
mod init;
mod error;
mod controllers;

pub use error::{ApiError, StatusCode};
pub use init::start_main_loop;

pub mod dispatcher {
    pub use flotilla_state_dispatcher::*;
}

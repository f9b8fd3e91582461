//!
//! # Daemon bring-up
//!
//! Resolves CLI options into a configuration, starts the control plane
//! over the simulated instance runtime and parks until a termination
//! signal flips the shutdown event.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::cli::OcOpt;
use crate::init::start_main_loop;
use crate::runtime::SimulatedRuntime;

/// run the controller until interrupted
pub async fn main_loop(opt: OcOpt) -> Result<()> {
    let config = opt.as_config()?;

    let ctx = start_main_loop(config, SimulatedRuntime::shared()).await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    ctx.shutdown().notify();

    // let the loops observe the event before the runtime drops
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

use anyhow::Result;
use clap::Parser;

use flotilla_oc::cli::OcOpt;
use flotilla_oc::start::main_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    main_loop(OcOpt::parse()).await
}

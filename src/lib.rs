pub mod analysis;
pub mod capture;
pub mod cli;
pub mod db;
pub mod pose;
pub mod seed;
pub mod settings;
mod utils;

use anyhow::Context;
use clap::Parser;

pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    let level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let cli = cli::Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rehabtrack")
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(cli::execute(cli))
}

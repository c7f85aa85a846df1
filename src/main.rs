use std::process::ExitCode;

use clap::Parser;
use testhost_bridge::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    cli::run(Cli::parse()).await
}

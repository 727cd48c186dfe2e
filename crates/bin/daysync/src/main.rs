use anyhow::Result;
use clap::Parser;
use daysync::{
    commands,
    config::{Cli, Command},
};

#[tokio::main]
async fn main() -> Result<()> {
    monitoring::logging::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sync(config) => commands::sync::run(config).await,
    }
}

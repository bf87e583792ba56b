// etl-anywhere - Main entry point
// Provision, run and manage ET:Legacy servers in Docker

use clap::Parser;
use etl_anywhere_lib::cli::{Cli, Command};
use etl_anywhere_lib::commands::{compose, entrypoint, fetch_maps, install, manage, render};
use etl_anywhere_lib::error::Result;
use etl_anywhere_lib::paths;
use std::error::Error as _;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Keep the Docker and HTTP clients quiet unless asked for
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bollard=warn,hyper=warn,reqwest=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let dir = paths::install_dir(cli.dir.as_deref());

    match cli.command {
        Command::Entrypoint(opts) => {
            let code = entrypoint::execute(opts).await?;
            return Ok(u8::try_from(code).unwrap_or(1));
        }
        Command::Install(opts) => install::execute(&dir, opts)?,
        Command::Compose => compose::execute(&dir)?,
        Command::Render(opts) => render::execute(&dir, opts)?,
        Command::FetchMaps(opts) => fetch_maps::execute(&dir, opts).await?,
        Command::Start(opts) => manage::start(&dir, opts).await?,
        Command::Stop(opts) => manage::stop(&dir, opts).await?,
        Command::Restart(opts) => manage::restart(&dir, opts).await?,
        Command::Status(opts) => manage::status(&dir, opts).await?,
        Command::Logs(opts) => manage::logs(&dir, opts).await?,
        Command::Rcon(opts) => manage::rcon(&dir, opts).await?,
        Command::Update(opts) => manage::update(&dir, opts).await?,
    }
    Ok(0)
}

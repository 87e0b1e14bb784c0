mod cli;
mod commands;
mod config;
mod format;
mod util;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rd200_types::RadonUnit;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{WatchArgs, cmd_config, cmd_read, cmd_scan, cmd_watch};
use crate::config::{Config, resolve_interval};
use crate::util::resolve_target;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet mode suppresses info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { timeout, format } => {
            cmd_scan(timeout, format, output, cli.quiet).await?;
        }
        Commands::Read {
            device,
            output: out,
        } => {
            let target = resolve_target(&device, &config).await?;
            let unit = RadonUnit::from_metric(out.resolve_bq(config.bq));
            let session_config = config.timeouts.session_config(device.timeout);
            cmd_read(&target, unit, session_config, out.format, output).await?;
        }
        Commands::Watch {
            device,
            output: out,
            interval,
            count,
        } => {
            let target = resolve_target(&device, &config).await?;
            let args = WatchArgs {
                target,
                unit: RadonUnit::from_metric(out.resolve_bq(config.bq)),
                session_config: config.timeouts.session_config(device.timeout),
                interval: Duration::from_secs(resolve_interval(interval, &config)),
                count,
                format: out.format,
                output,
            };
            cmd_watch(args, cli.quiet).await?;
        }
        Commands::Config { action } => {
            cmd_config(action, config)?;
        }
    }

    Ok(())
}

//! Watch command implementation.
//!
//! Every poll runs a fresh session: connect, read, disconnect. Nothing stays
//! connected between polls. The last good snapshot is kept in memory and
//! replaced only when a poll succeeds.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rd200_core::{BleTransport, SessionConfig, Transport, run_session_with_config};
use rd200_types::{DeviceSnapshot, RadonUnit};
use tokio::time::{MissedTickBehavior, interval};

use crate::cli::OutputFormat;
use crate::format::{format_watch_json, format_watch_line};
use crate::util::{Target, append_output};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub target: Target,
    pub unit: RadonUnit,
    pub session_config: SessionConfig,
    pub interval: Duration,
    /// Number of polls to run, 0 for unlimited.
    pub count: u32,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
}

/// Polling state across sessions.
#[derive(Debug, Default)]
pub struct Watcher {
    last: Option<DeviceSnapshot>,
    polls: u32,
    failures: u32,
}

impl Watcher {
    /// The most recent successful snapshot.
    pub fn last(&self) -> Option<&DeviceSnapshot> {
        self.last.as_ref()
    }

    /// Polls attempted so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Polls that failed.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Poll until `count` polls have run or `shutdown` resolves.
    ///
    /// `emit` is called with each new snapshot. A failed poll is logged and
    /// the previous snapshot is kept.
    pub async fn run<T, F>(
        &mut self,
        transport: &T,
        args: &WatchArgs<'_>,
        shutdown: impl Future<Output = ()>,
        mut emit: F,
    ) -> Result<()>
    where
        T: Transport,
        F: FnMut(&DeviceSnapshot) -> Result<()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = interval(args.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if args.count > 0 && self.polls >= args.count {
                tracing::info!("Completed {} polls", self.polls);
                return Ok(());
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => return Ok(()),
            }

            self.polls += 1;
            let result = tokio::select! {
                result = run_session_with_config(
                    transport,
                    &args.target.address,
                    &args.target.name,
                    args.unit,
                    args.session_config.clone(),
                ) => result,
                _ = &mut shutdown => return Ok(()),
            };

            match result {
                Ok(snapshot) => {
                    emit(&snapshot)?;
                    self.last = Some(snapshot);
                }
                Err(e) => {
                    self.failures += 1;
                    match self.last.as_ref().and_then(|s| s.captured_at) {
                        Some(captured_at) => {
                            let age = time::OffsetDateTime::now_utc() - captured_at;
                            tracing::warn!(
                                "Poll {} failed: {}. Keeping snapshot from {}s ago",
                                self.polls,
                                e,
                                age.whole_seconds()
                            );
                        }
                        None => tracing::warn!("Poll {} failed: {}", self.polls, e),
                    }
                }
            }
        }
    }
}

pub async fn cmd_watch(args: WatchArgs<'_>, quiet: bool) -> Result<()> {
    let transport = BleTransport::new()
        .await
        .context("No Bluetooth adapter available")?;

    if !quiet {
        eprintln!("Watching: {} ({})", args.target.name, args.target.address);
        if args.count > 0 {
            eprintln!(
                "Interval: {}s | Count: {} | Press Ctrl+C to stop",
                args.interval.as_secs(),
                args.count
            );
        } else {
            eprintln!("Interval: {}s | Press Ctrl+C to stop", args.interval.as_secs());
        }
        eprintln!("{}", "-".repeat(50));
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let format = args.format;
    let output = args.output;
    let mut watcher = Watcher::default();
    watcher
        .run(&transport, &args, shutdown, |snapshot| {
            let line = match format {
                OutputFormat::Json => format_watch_json(snapshot)?,
                OutputFormat::Text => format_watch_line(snapshot),
            };
            append_output(output, &line)
        })
        .await?;

    if !quiet {
        eprintln!(
            "\nStopped after {} polls ({} failed).",
            watcher.polls(),
            watcher.failures()
        );
        if let Some(last) = watcher.last() {
            eprint!("Last reading: {}", format_watch_line(last));
        }
    }
    Ok(())
}

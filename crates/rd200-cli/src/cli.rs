//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable device selection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device address (MAC address or UUID), or use RD200_DEVICE env var
    #[arg(short, long, env = "RD200_DEVICE")]
    pub device: Option<String>,

    /// Advertised name (e.g. FR:RD-0001); skips the scan when given with --device
    #[arg(short, long, env = "RD200_NAME")]
    pub name: Option<String>,

    /// Scan duration in seconds when the device has to be looked up
    #[arg(long, default_value = "5")]
    pub scan_timeout: u64,

    /// Timeout for each connection attempt in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Use Bq/m³ for radon (overrides --pci and config)
    #[arg(long, conflicts_with = "pci")]
    pub bq: bool,

    /// Use pCi/L for radon (overrides config)
    #[arg(long, conflicts_with = "bq")]
    pub pci: bool,
}

impl OutputArgs {
    /// Resolve bq setting: explicit flags override config
    pub fn resolve_bq(&self, config_bq: bool) -> bool {
        if self.bq {
            true
        } else if self.pci {
            false
        } else {
            config_bq
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "rd200")]
#[command(author, version, about = "CLI for RadonEye RD200 radon monitors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby RD200 monitors
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Read the current values from a monitor
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Poll a monitor repeatedly until interrupted
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many polls (0 for unlimited)
        #[arg(short, long, default_value = "0")]
        count: u32,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the current configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Set a configuration value
    Set {
        /// Key (device, name, bq, interval, timeouts.levels, timeouts.peak,
        /// timeouts.uptime, timeouts.connect)
        key: String,
        /// Value
        value: String,
    },
    /// Reset a configuration value to its default
    Unset {
        /// Key
        key: String,
    },
}

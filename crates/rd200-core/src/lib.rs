//! Core BLE driver for RadonEye RD200 radon monitors.
//!
//! The RD200 answers single-byte commands with one notification each.
//! This crate runs those exchanges, decodes the replies for both firmware
//! generations, and assembles them into a [`DeviceSnapshot`].
//!
//! # Features
//!
//! - **Dialect selection**: `FR:R2` devices speak the legacy dialect, every
//!   other supported name the standard one
//! - **Bounded exchanges**: every command has its own deadline; a missing
//!   reply leaves that command's metrics absent instead of failing the poll
//! - **Stale-reply protection**: each exchange gets a fresh one-shot channel,
//!   so a late notification can never answer the next command
//! - **Pluggable transport**: btleplug for real hardware, a scripted mock
//!   for tests
//!
//! # Supported Devices
//!
//! | Name prefix | Dialect | Commands |
//! |-------------|---------|----------|
//! | `FR:R2` | legacy | levels (`0x50`), peak + uptime (`0x51`) |
//! | `FR:RU`, `FR:RE`, `FR:GI`, `FR:H`, `FR:RD`, `FR:GL`, `FR:GJ`, `FR:I` | standard | levels (`0x50`), peak (`0x40`), uptime (`0x51`) |
//!
//! # Platform Differences
//!
//! On Linux and Windows devices are addressed by MAC address. On macOS
//! CoreBluetooth hides addresses, so use the peripheral UUID reported by
//! [`scan::scan_for_devices`] as the address instead.
//!
//! # Quick Start
//!
//! ```no_run
//! use rd200_core::{BleTransport, RadonUnit, run_session, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = scan::scan_for_devices(scan::ScanOptions::default()).await?;
//!     let transport = BleTransport::new().await?;
//!
//!     for device in devices {
//!         let snapshot =
//!             run_session(&transport, &device.identifier, &device.name, RadonUnit::BqPerM3).await?;
//!         println!("{}: {:?}", snapshot.name, snapshot.sensors);
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod commands;
pub mod error;
pub mod legacy;
pub mod mock;
pub mod protocol;
pub mod retry;
pub mod scan;
pub mod session;
pub mod standard;
pub mod traits;
pub mod transaction;

pub use rd200_types as types;
pub use rd200_types::{
    CharacteristicPair, DeviceSnapshot, Metric, MetricValue, ParseError, ProtocolVariant,
    RadonUnit, SnapshotUpdate, Uptime,
};

pub use ble::{BleConfig, BleConnection, BleTransport};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use protocol::RadonProtocol;
pub use retry::{RetryConfig, with_retry};
pub use scan::{DiscoveredDevice, ScanOptions};
pub use session::{
    Session, SessionConfig, SessionState, Step, run_session, run_session_with_config,
};
pub use traits::{Connection, NotificationCallback, Transport};
pub use transaction::{Command, RawFrame, TransactionOutcome};

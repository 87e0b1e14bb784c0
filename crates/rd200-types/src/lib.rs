//! Platform-agnostic types for RadonEye RD200 radon monitors.
//!
//! This crate provides the types shared by the BLE driver (rd200-core) and
//! anything that consumes its snapshots.
//!
//! # Features
//!
//! - Protocol dialect classification from the advertised name
//! - Device snapshot and metric types
//! - UUID constants for the command/notify characteristics
//! - Error types for frame parsing
//!
//! # Example
//!
//! ```
//! use rd200_types::{DeviceSnapshot, Metric, MetricValue, ProtocolVariant};
//!
//! let variant = ProtocolVariant::from_name("FR:RD-0001");
//! assert_eq!(variant, Some(ProtocolVariant::Standard));
//!
//! let mut snapshot = DeviceSnapshot::new("AA:BB:CC:DD:EE:FF", "FR:RD-0001");
//! snapshot.record(Metric::Radon, MetricValue::Number(42.0));
//! assert_eq!(snapshot.number(Metric::Radon), Some(42.0));
//! assert!(!snapshot.has(Metric::RadonPeak));
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    BQ_TO_PCI_MULTIPLIER, CharacteristicPair, DeviceSnapshot, LEGACY_R2_PREFIX, Metric,
    MetricValue, ProtocolVariant, RadonUnit, SUPPORTED_PREFIXES, SnapshotUpdate, Uptime,
    round_hundredths,
};
pub use self::uuid as uuids;

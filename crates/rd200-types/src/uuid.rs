//! Bluetooth UUIDs for RD200 devices.
//!
//! Both dialects use a single write characteristic for commands and a
//! single notify characteristic for replies. Only the UUID base differs.

use uuid::{Uuid, uuid};

// --- Current firmware ---

/// Notify characteristic carrying reply frames.
pub const STANDARD_READ: Uuid = uuid!("00001525-0000-1000-8000-00805f9b34fb");

/// Write characteristic receiving command bytes.
pub const STANDARD_WRITE: Uuid = uuid!("00001524-0000-1000-8000-00805f9b34fb");

// --- FR:R2 firmware ---

/// Notify characteristic carrying reply frames on `FR:R2` devices.
pub const LEGACY_READ: Uuid = uuid!("00001525-1212-efde-1523-785feabcd123");

/// Write characteristic receiving command bytes on `FR:R2` devices.
pub const LEGACY_WRITE: Uuid = uuid!("00001524-1212-efde-1523-785feabcd123");

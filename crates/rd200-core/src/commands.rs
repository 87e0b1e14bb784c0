//! BLE command constants for RD200 devices.
//!
//! Every command is a single byte written to the dialect's write
//! characteristic. The reply arrives as one notification on the paired
//! notify characteristic.

/// Request radon levels.
///
/// Standard reply: 12 bytes, u16 Bq/m³ fields.
/// `FR:R2` reply: at least 13 bytes, f32 pCi/L fields.
pub const READ_LEVELS: u8 = 0x50;

/// Request peak level and firmware identity (standard dialect only).
///
/// Reply: 68 bytes.
pub const READ_PEAK: u8 = 0x40;

/// Request uptime.
///
/// Standard reply: 16 bytes. On `FR:R2` the same command also returns the
/// peak level.
pub const READ_UPTIME: u8 = 0x51;

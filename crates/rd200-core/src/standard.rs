//! Current-firmware dialect.
//!
//! Three separate exchanges on the standard characteristic pair:
//!
//! | Command | Reply | Layout |
//! |---------|-------|--------|
//! | `0x50` levels | 12 bytes | `[2:4]` now, `[4:6]` 1-day, `[6:8]` 1-month, `[8:10]`/`[10:12]` pulse counters (u16 LE, Bq/m³) |
//! | `0x40` peak | 68 bytes | `[16:21]` hardware version, `[22:30]` software version (text), `[51:53]` peak (u16 LE, Bq/m³) |
//! | `0x51` uptime | 16 bytes | `[4:8]` minutes (u32 LE) |
//!
//! Replies must have exactly these lengths; anything else is discarded.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Buf;

use rd200_types::{
    CharacteristicPair, Metric, ParseError, ParseResult, ProtocolVariant, RadonUnit,
    SnapshotUpdate, Uptime,
};

use crate::commands::{READ_LEVELS, READ_PEAK, READ_UPTIME};
use crate::error::Result;
use crate::protocol::{RadonProtocol, run_decoded, uptime_update};
use crate::session::SessionConfig;
use crate::traits::Connection;
use crate::transaction::Command;

/// Length of the `0x50` reply.
pub const LEVELS_FRAME_LEN: usize = 12;
/// Length of the `0x40` reply.
pub const PEAK_FRAME_LEN: usize = 68;
/// Length of the `0x51` reply.
pub const UPTIME_FRAME_LEN: usize = 16;

/// Decoded `0x50` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    /// Current level in Bq/m³.
    pub now: u16,
    /// 1-day average in Bq/m³.
    pub day: u16,
    /// 1-month average in Bq/m³.
    pub month: u16,
    /// Pulse counter, current window.
    pub count_now: u16,
    /// Pulse counter, previous window.
    pub count_last: u16,
}

impl Levels {
    /// Metrics in `unit`.
    pub fn to_update(&self, unit: RadonUnit) -> SnapshotUpdate {
        SnapshotUpdate::empty()
            .with(Metric::Radon, unit.from_bq(f64::from(self.now)))
            .with(Metric::Radon1DayLevel, unit.from_bq(f64::from(self.day)))
            .with(Metric::Radon1MonthLevel, unit.from_bq(f64::from(self.month)))
            .with(Metric::RadonCNow, f64::from(self.count_now))
            .with(Metric::RadonCLast, f64::from(self.count_last))
    }
}

/// Decoded `0x40` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peak {
    /// Peak level in Bq/m³.
    pub peak: u16,
    /// Hardware version text.
    pub hw_version: String,
    /// Software version text.
    pub sw_version: String,
}

impl Peak {
    /// Metrics in `unit`, plus firmware identity when the device filled it in.
    pub fn to_update(&self, unit: RadonUnit) -> SnapshotUpdate {
        let mut update =
            SnapshotUpdate::empty().with(Metric::RadonPeak, unit.from_bq(f64::from(self.peak)));
        update.hw_version = non_empty(&self.hw_version);
        update.sw_version = non_empty(&self.sw_version);
        update
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn expect_len(command: u8, expected: usize, data: &[u8]) -> ParseResult<()> {
    if data.len() == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedLength {
            command,
            expected,
            actual: data.len(),
        })
    }
}

/// Fixed-width text field, NUL padded.
fn text_field(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Decode a `0x50` reply.
pub fn decode_levels(data: &[u8]) -> ParseResult<Levels> {
    expect_len(READ_LEVELS, LEVELS_FRAME_LEN, data)?;

    let mut buf = &data[2..];
    Ok(Levels {
        now: buf.get_u16_le(),
        day: buf.get_u16_le(),
        month: buf.get_u16_le(),
        count_now: buf.get_u16_le(),
        count_last: buf.get_u16_le(),
    })
}

/// Decode a `0x40` reply.
pub fn decode_peak(data: &[u8]) -> ParseResult<Peak> {
    expect_len(READ_PEAK, PEAK_FRAME_LEN, data)?;

    let mut buf = &data[51..53];
    Ok(Peak {
        peak: buf.get_u16_le(),
        hw_version: text_field(&data[16..21]),
        sw_version: text_field(&data[22..30]),
    })
}

/// Decode a `0x51` reply.
///
/// Only whole minutes are reported; the sub-minute part is always zero.
pub fn decode_uptime(data: &[u8]) -> ParseResult<Uptime> {
    expect_len(READ_UPTIME, UPTIME_FRAME_LEN, data)?;

    let mut buf = &data[4..8];
    Ok(Uptime::from_minutes(buf.get_u32_le()))
}

/// Current-firmware protocol.
#[derive(Debug, Clone)]
pub struct StandardProtocol {
    unit: RadonUnit,
    levels: Command,
    peak: Command,
    uptime: Command,
}

impl StandardProtocol {
    /// Protocol using the deadlines from `config`.
    pub fn new(config: &SessionConfig, unit: RadonUnit) -> Self {
        let command = |name, opcode, deadline: Duration| {
            Command::new(name, opcode, CharacteristicPair::STANDARD, deadline)
        };
        Self {
            unit,
            levels: command("levels", READ_LEVELS, config.levels_deadline),
            peak: command("peak", READ_PEAK, config.peak_deadline),
            uptime: command("uptime", READ_UPTIME, config.uptime_deadline),
        }
    }
}

#[async_trait]
impl RadonProtocol for StandardProtocol {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Standard
    }

    async fn run_levels_transaction(&self, conn: &mut dyn Connection) -> Result<SnapshotUpdate> {
        let unit = self.unit;
        run_decoded(conn, &self.levels, |data| {
            decode_levels(data).map(|levels| levels.to_update(unit))
        })
        .await
    }

    async fn run_peak_transaction(&self, conn: &mut dyn Connection) -> Result<SnapshotUpdate> {
        let unit = self.unit;
        run_decoded(conn, &self.peak, |data| {
            decode_peak(data).map(|peak| peak.to_update(unit))
        })
        .await
    }

    async fn run_uptime_transaction(&self, conn: &mut dyn Connection) -> Result<SnapshotUpdate> {
        run_decoded(conn, &self.uptime, |data| decode_uptime(data).map(uptime_update)).await
    }
}

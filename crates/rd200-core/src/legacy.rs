//! `FR:R2` firmware dialect.
//!
//! Two exchanges on the legacy characteristic pair. Values are f32 LE
//! already expressed in pCi/L.
//!
//! | Command | Reply | Layout |
//! |---------|-------|--------|
//! | `0x50` levels | ≥ 13 bytes | `[2:6]` now, `[6:10]` 1-day, `[10:14]` 1-month |
//! | `0x51` peak + uptime | ≥ 16 bytes | `[4:8]` uptime minutes (u32 LE), `[12:16]` peak |
//!
//! A 13-byte levels reply cannot hold the full 1-month field; it is decoded
//! only when the reply has 14 bytes or more.

use async_trait::async_trait;
use bytes::Buf;
use tracing::debug;

use rd200_types::{
    CharacteristicPair, Metric, ParseError, ParseResult, ProtocolVariant, RadonUnit,
    SnapshotUpdate, Uptime,
};

use crate::commands::{READ_LEVELS, READ_UPTIME};
use crate::error::Result;
use crate::protocol::{RadonProtocol, run_decoded, uptime_update};
use crate::session::SessionConfig;
use crate::traits::Connection;
use crate::transaction::Command;

/// Minimum length of the `0x50` reply.
pub const LEVELS_MIN_LEN: usize = 13;
/// Minimum length of the `0x51` reply.
pub const PEAK_UPTIME_MIN_LEN: usize = 16;

/// Decoded `0x50` reply, in pCi/L. Non-finite values are dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    /// Current level.
    pub now: Option<f32>,
    /// 1-day average.
    pub day: Option<f32>,
    /// 1-month average.
    pub month: Option<f32>,
}

impl Levels {
    /// Metrics in `unit`.
    pub fn to_update(&self, unit: RadonUnit) -> SnapshotUpdate {
        let mut update = SnapshotUpdate::empty();
        for (metric, value) in [
            (Metric::Radon, self.now),
            (Metric::Radon1DayLevel, self.day),
            (Metric::Radon1MonthLevel, self.month),
        ] {
            if let Some(pci) = value {
                update = update.with(metric, unit.from_pci(f64::from(pci)));
            }
        }
        update
    }
}

/// Decoded `0x51` reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakUptime {
    /// Peak level in pCi/L.
    pub peak: Option<f32>,
    /// Time since power-on.
    pub uptime: Uptime,
}

impl PeakUptime {
    /// Metrics in `unit`.
    pub fn to_update(&self, unit: RadonUnit) -> SnapshotUpdate {
        let mut update = uptime_update(self.uptime);
        if let Some(pci) = self.peak {
            update = update.with(Metric::RadonPeak, unit.from_pci(f64::from(pci)));
        }
        update
    }
}

fn expect_min_len(command: u8, minimum: usize, data: &[u8]) -> ParseResult<()> {
    if data.len() >= minimum {
        Ok(())
    } else {
        Err(ParseError::TooShort {
            command,
            minimum,
            actual: data.len(),
        })
    }
}

fn finite(value: f32) -> Option<f32> {
    if value.is_finite() {
        Some(value)
    } else {
        debug!(value, "Dropping non-finite reading");
        None
    }
}

/// Decode a `0x50` reply.
pub fn decode_levels(data: &[u8]) -> ParseResult<Levels> {
    expect_min_len(READ_LEVELS, LEVELS_MIN_LEN, data)?;

    let mut buf = &data[2..];
    let now = finite(buf.get_f32_le());
    let day = finite(buf.get_f32_le());
    let month = if buf.remaining() >= 4 {
        finite(buf.get_f32_le())
    } else {
        None
    };

    Ok(Levels { now, day, month })
}

/// Decode a `0x51` reply.
pub fn decode_peak_uptime(data: &[u8]) -> ParseResult<PeakUptime> {
    expect_min_len(READ_UPTIME, PEAK_UPTIME_MIN_LEN, data)?;

    let mut minutes = &data[4..8];
    let mut peak = &data[12..16];
    Ok(PeakUptime {
        peak: finite(peak.get_f32_le()),
        uptime: Uptime::from_minutes(minutes.get_u32_le()),
    })
}

/// `FR:R2` protocol.
///
/// Peak and uptime arrive in one reply, so [`RadonProtocol::run_peak_transaction`]
/// performs the combined exchange and [`RadonProtocol::run_uptime_transaction`]
/// has nothing left to do.
#[derive(Debug, Clone)]
pub struct LegacyProtocol {
    unit: RadonUnit,
    levels: Command,
    peak_uptime: Command,
}

impl LegacyProtocol {
    /// Protocol using the deadlines from `config`.
    pub fn new(config: &SessionConfig, unit: RadonUnit) -> Self {
        Self {
            unit,
            levels: Command::new(
                "levels",
                READ_LEVELS,
                CharacteristicPair::LEGACY,
                config.levels_deadline,
            ),
            peak_uptime: Command::new(
                "peak+uptime",
                READ_UPTIME,
                CharacteristicPair::LEGACY,
                config.peak_deadline.max(config.uptime_deadline),
            ),
        }
    }
}

#[async_trait]
impl RadonProtocol for LegacyProtocol {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::LegacyR2
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
        run_decoded(conn, &self.peak_uptime, |data| {
            decode_peak_uptime(data).map(|reply| reply.to_update(unit))
        })
        .await
    }

    async fn run_uptime_transaction(&self, _conn: &mut dyn Connection) -> Result<SnapshotUpdate> {
        Ok(SnapshotUpdate::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd200_types::MetricValue;
    use crate::mock::frames;

    #[test]
    fn test_decode_levels_float_values() {
        let levels = decode_levels(&frames::legacy_levels(111.0, 2.5, 1.0)).unwrap();
        assert_eq!(levels.now, Some(111.0));

        let us = levels.to_update(RadonUnit::PciPerL);
        assert_eq!(
            us.metrics,
            vec![
                (Metric::Radon, MetricValue::Number(111.0)),
                (Metric::Radon1DayLevel, MetricValue::Number(2.5)),
                (Metric::Radon1MonthLevel, MetricValue::Number(1.0)),
            ]
        );

        // Floats are pCi/L, so Bq/m³ divides by BQ_TO_PCI_MULTIPLIER (1/37): 111 -> 4107, not 3.
        let metric = levels.to_update(RadonUnit::BqPerM3);
        assert_eq!(metric.metrics[0], (Metric::Radon, MetricValue::Number(4107.0)));
        assert_eq!(metric.metrics[1], (Metric::Radon1DayLevel, MetricValue::Number(92.5)));
        // 3.0 is the opposite direction, 111 Bq/m³ read as pCi/L.
        assert_eq!(RadonUnit::PciPerL.from_bq(111.0), 3.0);
    }

    #[test]
    fn test_decode_levels_thirteen_bytes_drops_month() {
        let mut frame = frames::legacy_levels(1.0, 2.0, 3.0);
        frame.truncate(13);
        let levels = decode_levels(&frame).unwrap();
        assert_eq!(levels.now, Some(1.0));
        assert_eq!(levels.day, Some(2.0));
        assert_eq!(levels.month, None);
    }

    #[test]
    fn test_decode_levels_too_short() {
        let err = decode_levels(&[0u8; 12]).unwrap_err();
        assert_eq!(
            err,
            ParseError::TooShort {
                command: READ_LEVELS,
                minimum: 13,
                actual: 12
            }
        );
    }

    #[test]
    fn test_decode_levels_drops_nan() {
        let levels = decode_levels(&frames::legacy_levels(f32::NAN, 1.0, 2.0)).unwrap();
        assert_eq!(levels.now, None);
        let update = levels.to_update(RadonUnit::PciPerL);
        assert_eq!(update.metrics.len(), 2);
    }

    #[test]
    fn test_decode_peak_uptime() {
        let reply = decode_peak_uptime(&frames::legacy_peak_uptime(4.0, 1500)).unwrap();
        assert_eq!(reply.peak, Some(4.0));
        assert_eq!(reply.uptime.to_string(), "1d 01:00:00");

        let update = reply.to_update(RadonUnit::BqPerM3);
        assert!(update.metrics.contains(&(Metric::RadonPeak, MetricValue::Number(148.0))));
        assert!(update.metrics.contains(&(Metric::RadonUptime, MetricValue::Number(90000.0))));
    }

    #[test]
    fn test_decode_peak_uptime_accepts_longer_frames() {
        let mut frame = frames::legacy_peak_uptime(1.0, 60);
        frame.extend_from_slice(&[0xEE; 4]);
        assert!(decode_peak_uptime(&frame).is_ok());
        assert!(decode_peak_uptime(&frame[..15]).is_err());
    }
}

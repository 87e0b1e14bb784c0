//! Per-dialect command sequences.
//!
//! A [`RadonProtocol`] knows which commands its dialect sends, on which
//! characteristics, and how to decode the replies. The session picks one
//! implementation from the advertised name and never branches on the dialect
//! again.

use async_trait::async_trait;
use tracing::warn;

use rd200_types::{Metric, ParseResult, ProtocolVariant, RadonUnit, SnapshotUpdate, Uptime};

use crate::error::Result;
use crate::legacy::LegacyProtocol;
use crate::session::SessionConfig;
use crate::standard::StandardProtocol;
use crate::traits::Connection;
use crate::transaction::{self, Command, TransactionOutcome};

/// The command/decode behavior of one protocol dialect.
///
/// Every method runs zero or one transaction. A reply that never comes or
/// cannot be decoded yields an empty update; only transport failures are
/// returned as errors.
#[async_trait]
pub trait RadonProtocol: Send + Sync {
    /// The dialect implemented.
    fn variant(&self) -> ProtocolVariant;

    /// Read current, 1-day and 1-month radon levels.
    async fn run_levels_transaction(&self, conn: &mut dyn Connection) -> Result<SnapshotUpdate>;

    /// Read the peak level (and, where the dialect carries it, firmware identity).
    async fn run_peak_transaction(&self, conn: &mut dyn Connection) -> Result<SnapshotUpdate>;

    /// Read the uptime.
    async fn run_uptime_transaction(&self, conn: &mut dyn Connection) -> Result<SnapshotUpdate>;
}

/// The protocol implementation for `variant`.
pub fn for_variant(
    variant: ProtocolVariant,
    config: &SessionConfig,
    unit: RadonUnit,
) -> Box<dyn RadonProtocol> {
    match variant {
        ProtocolVariant::Standard => Box::new(StandardProtocol::new(config, unit)),
        ProtocolVariant::LegacyR2 => Box::new(LegacyProtocol::new(config, unit)),
    }
}

/// Run `command` and decode its reply with `decode`.
///
/// Timeouts and undecodable frames become an empty update.
pub(crate) async fn run_decoded<F>(
    conn: &mut dyn Connection,
    command: &Command,
    decode: F,
) -> Result<SnapshotUpdate>
where
    F: FnOnce(&[u8]) -> ParseResult<SnapshotUpdate> + Send,
{
    match transaction::execute(conn, command).await? {
        TransactionOutcome::Frame(frame) => match decode(frame.as_bytes()) {
            Ok(update) => Ok(update),
            Err(e) => {
                warn!(command = command.name, error = %e, "Discarding reply");
                Ok(SnapshotUpdate::empty())
            }
        },
        TransactionOutcome::TimedOut => Ok(SnapshotUpdate::empty()),
    }
}

/// Uptime metrics shared by both dialects.
pub(crate) fn uptime_update(uptime: Uptime) -> SnapshotUpdate {
    SnapshotUpdate::empty()
        .with(Metric::RadonUptime, uptime.total_seconds())
        .with(Metric::RadonUptimeString, uptime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd200_types::MetricValue;

    #[test]
    fn test_for_variant_selects_implementation() {
        let config = SessionConfig::default();
        assert_eq!(
            for_variant(ProtocolVariant::Standard, &config, RadonUnit::BqPerM3).variant(),
            ProtocolVariant::Standard
        );
        assert_eq!(
            for_variant(ProtocolVariant::LegacyR2, &config, RadonUnit::PciPerL).variant(),
            ProtocolVariant::LegacyR2
        );
    }

    #[test]
    fn test_uptime_update() {
        let update = uptime_update(Uptime::from_minutes(1500));
        assert_eq!(
            update.metrics,
            vec![
                (Metric::RadonUptime, MetricValue::Number(90000.0)),
                (Metric::RadonUptimeString, "1d 01:00:00".to_string().into()),
            ]
        );
    }
}

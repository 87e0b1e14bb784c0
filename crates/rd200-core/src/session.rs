//! One connect → commands → disconnect cycle against an RD200.
//!
//! A [`Session`] is built per poll from the device address and advertised
//! name, run once, and discarded. It classifies the protocol dialect up
//! front, runs that dialect's commands in order, and merges every decoded
//! reply into a [`DeviceSnapshot`]. Commands that get no usable reply leave
//! their metrics absent; the session still moves on to the next command and
//! always closes the link at the end.
//!
//! # Example
//!
//! ```no_run
//! use rd200_core::{BleTransport, RadonUnit, Session};
//!
//! # async fn example() -> rd200_core::Result<()> {
//! let transport = BleTransport::new().await?;
//! let snapshot = Session::new("AA:BB:CC:DD:EE:FF", "FR:RD-0001", RadonUnit::BqPerM3)?
//!     .run(&transport)
//!     .await?;
//! println!("{:?}", snapshot.sensors);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use rd200_types::{DeviceSnapshot, ProtocolVariant, RadonUnit};

use crate::error::{Error, Result};
use crate::protocol::{self, RadonProtocol};
use crate::retry::{RetryConfig, with_retry};
use crate::traits::{Connection, Transport};

/// Default deadline for each command's reply.
pub const DEFAULT_COMMAND_DEADLINE: Duration = Duration::from_secs(5);

/// Default timeout for each attempt at establishing the link.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeouts and connect retry policy used by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for the levels reply.
    pub levels_deadline: Duration,
    /// Deadline for the peak reply.
    pub peak_deadline: Duration,
    /// Deadline for the uptime reply.
    pub uptime_deadline: Duration,
    /// Timeout for each connect attempt.
    pub connect_timeout: Duration,
    /// Retry policy for connect attempts that time out or fail transiently.
    #[serde(skip)]
    pub connect_retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            levels_deadline: DEFAULT_COMMAND_DEADLINE,
            peak_deadline: DEFAULT_COMMAND_DEADLINE,
            uptime_deadline: DEFAULT_COMMAND_DEADLINE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retry: RetryConfig::for_connect(),
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the levels deadline.
    #[must_use]
    pub fn levels_deadline(mut self, deadline: Duration) -> Self {
        self.levels_deadline = deadline;
        self
    }

    /// Set the peak deadline.
    #[must_use]
    pub fn peak_deadline(mut self, deadline: Duration) -> Self {
        self.peak_deadline = deadline;
        self
    }

    /// Set the uptime deadline.
    ///
    /// Some firmware is slow to answer this one; 10 s is a reasonable
    /// ceiling.
    #[must_use]
    pub fn uptime_deadline(mut self, deadline: Duration) -> Self {
        self.uptime_deadline = deadline;
        self
    }

    /// Set all three command deadlines.
    #[must_use]
    pub fn command_deadline(self, deadline: Duration) -> Self {
        self.levels_deadline(deadline)
            .peak_deadline(deadline)
            .uptime_deadline(deadline)
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the connect retry policy.
    #[must_use]
    pub fn connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Check the config for values a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("levels_deadline", self.levels_deadline),
            ("peak_deadline", self.peak_deadline),
            ("uptime_deadline", self.uptime_deadline),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// Command step within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Radon levels.
    Levels,
    /// Peak level.
    Peak,
    /// Uptime.
    Uptime,
}

impl Step {
    /// Steps in the order they run.
    pub const ORDER: [Step; 3] = [Step::Levels, Step::Peak, Step::Uptime];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Levels => write!(f, "levels"),
            Step::Peak => write!(f, "peak"),
            Step::Uptime => write!(f, "uptime"),
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built, not yet connected.
    Created,
    /// Link established, no command running.
    Connected,
    /// A command exchange is in flight.
    RunningCommand(Step),
    /// Link closed; the session is finished.
    Disconnected,
}

/// A single polling cycle against one device.
#[derive(Debug, Clone)]
pub struct Session {
    address: String,
    name: String,
    identifier: Option<String>,
    variant: ProtocolVariant,
    unit: RadonUnit,
    config: SessionConfig,
    state: SessionState,
}

impl Session {
    /// Prepare a session for the device advertising `name` at `address`.
    ///
    /// Fails with [`Error::UnclassifiableDevice`] when `name` is not an
    /// RD200 name; no connection is attempted in that case.
    pub fn new(address: impl Into<String>, name: impl Into<String>, unit: RadonUnit) -> Result<Self> {
        let name = name.into();
        let variant = ProtocolVariant::from_name(&name).ok_or_else(|| Error::unclassifiable(&name))?;
        Ok(Self {
            address: address.into(),
            name,
            identifier: None,
            variant,
            unit,
            config: SessionConfig::default(),
            state: SessionState::Created,
        })
    }

    /// Use custom timeouts.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the snapshot identifier (defaults to the advertised name).
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Dialect this session will speak.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, state: SessionState) {
        debug!(from = ?self.state, to = ?state, "Session state change");
        self.state = state;
    }

    /// Connect, run the dialect's commands, and disconnect.
    ///
    /// A session runs once; calling this again returns
    /// [`Error::InvalidConfig`].
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(address = %self.address, name = %self.name, variant = %self.variant)
    )]
    pub async fn run<T: Transport>(&mut self, transport: &T) -> Result<DeviceSnapshot> {
        if self.state != SessionState::Created {
            return Err(Error::invalid_config(
                "session has already run; create a new one for each poll",
            ));
        }
        self.config.validate()?;

        let connected = self.connect(transport).await;
        let mut conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                self.enter(SessionState::Disconnected);
                return Err(e);
            }
        };
        self.enter(SessionState::Connected);
        info!("Connected");

        let protocol = protocol::for_variant(self.variant, &self.config, self.unit);

        let mut snapshot = DeviceSnapshot::new(self.address.clone(), self.name.clone());
        if let Some(identifier) = &self.identifier {
            snapshot.identifier = identifier.clone();
        }
        snapshot.variant = Some(self.variant);
        snapshot.unit = self.unit;

        let result = self
            .run_commands(protocol.as_ref(), &mut conn, &mut snapshot)
            .await;

        if let Err(e) = &result
            && e.is_missing_characteristic()
        {
            warn!(error = %e, "Device is missing a characteristic, clearing service cache");
            if let Err(clear) = conn.clear_service_cache().await {
                warn!(error = %clear, "Failed to clear service cache");
            }
        }

        if let Err(e) = conn.disconnect().await {
            warn!(error = %e, "Disconnect failed");
        }
        self.enter(SessionState::Disconnected);
        info!("Disconnected");

        result?;
        snapshot.captured_at = Some(OffsetDateTime::now_utc());
        Ok(snapshot)
    }

    /// Connect with a timeout on every attempt, retrying per `connect_retry`.
    async fn connect<T: Transport>(&self, transport: &T) -> Result<T::Connection> {
        let address = self.address.as_str();
        let attempt_timeout = self.config.connect_timeout;
        with_retry(&self.config.connect_retry, "connect", move || async move {
            timeout(attempt_timeout, transport.connect(address))
                .await
                .unwrap_or_else(|_| Err(Error::timeout("connect", attempt_timeout)))
        })
        .await
    }

    async fn run_commands(
        &mut self,
        protocol: &dyn RadonProtocol,
        conn: &mut dyn Connection,
        snapshot: &mut DeviceSnapshot,
    ) -> Result<()> {
        for step in Step::ORDER {
            self.enter(SessionState::RunningCommand(step));
            let update = match step {
                Step::Levels => protocol.run_levels_transaction(conn).await?,
                Step::Peak => protocol.run_peak_transaction(conn).await?,
                Step::Uptime => protocol.run_uptime_transaction(conn).await?,
            };
            if update.is_empty() {
                debug!(%step, "No values from this step");
            }
            snapshot.merge(update);
            self.enter(SessionState::Connected);
        }
        Ok(())
    }
}

/// Run one session with default timeouts.
///
/// `unit` picks the unit concentrations are reported in; use
/// [`RadonUnit::from_metric`] for a metric/imperial flag.
pub async fn run_session<T: Transport>(
    transport: &T,
    address: &str,
    advertised_name: &str,
    unit: RadonUnit,
) -> Result<DeviceSnapshot> {
    run_session_with_config(transport, address, advertised_name, unit, SessionConfig::default())
        .await
}

/// Run one session with custom timeouts.
pub async fn run_session_with_config<T: Transport>(
    transport: &T,
    address: &str,
    advertised_name: &str,
    unit: RadonUnit,
    config: SessionConfig,
) -> Result<DeviceSnapshot> {
    Session::new(address, advertised_name, unit)?
        .with_config(config)
        .run(transport)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, frames};

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.levels_deadline, Duration::from_secs(5));
        assert_eq!(config.peak_deadline, Duration::from_secs(5));
        assert_eq!(config.uptime_deadline, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.connect_retry, RetryConfig::for_connect());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"uptime_deadline":{"secs":10,"nanos":0}}"#).unwrap();
        assert_eq!(config.uptime_deadline, Duration::from_secs(10));
        assert_eq!(config.levels_deadline, DEFAULT_COMMAND_DEADLINE);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.connect_retry, RetryConfig::for_connect());
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .command_deadline(Duration::from_secs(2))
            .uptime_deadline(Duration::from_secs(10));
        assert_eq!(config.levels_deadline, Duration::from_secs(2));
        assert_eq!(config.uptime_deadline, Duration::from_secs(10));
    }

    #[test]
    fn test_config_rejects_zero_deadline() {
        let err = SessionConfig::new()
            .peak_deadline(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("peak_deadline"));
    }

    #[test]
    fn test_new_classifies_variant() {
        let session = Session::new("AA", "FR:R2-1234", RadonUnit::BqPerM3).unwrap();
        assert_eq!(session.variant(), ProtocolVariant::LegacyR2);
        assert_eq!(session.state(), SessionState::Created);

        let err = Session::new("AA", "Other", RadonUnit::BqPerM3).unwrap_err();
        assert!(matches!(err, Error::UnclassifiableDevice { .. }));
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let transport = MockTransport::standard(
            frames::standard_levels(1, 2, 3),
            frames::standard_peak(4, "", ""),
            frames::standard_uptime(5),
        );
        let mut session = Session::new("AA", "FR:RD-1", RadonUnit::BqPerM3)
            .unwrap()
            .with_identifier("basement");

        let snapshot = session.run(&transport).await.unwrap();
        assert_eq!(snapshot.identifier, "basement");
        assert_eq!(session.state(), SessionState::Disconnected);

        assert!(matches!(
            session.run(&transport).await,
            Err(Error::InvalidConfig(_))
        ));
    }
}

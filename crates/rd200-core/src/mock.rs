//! Mock transport for testing without BLE hardware.
//!
//! [`MockTransport`] answers command writes with scripted notification
//! frames and records every GATT operation so tests can assert on the exact
//! sequence a session performed.
//!
//! # Example
//!
//! ```
//! use rd200_core::mock::{frames, MockTransport};
//! use rd200_core::{run_session, RadonUnit};
//!
//! # async fn example() -> rd200_core::Result<()> {
//! let transport = MockTransport::standard(
//!     frames::standard_levels(50, 40, 30),
//!     frames::standard_peak(120, "RD200", "V1.2.3"),
//!     frames::standard_uptime(1500),
//! );
//!
//! let snapshot = run_session(&transport, "AA:BB:CC:DD:EE:FF", "FR:RD-0001", RadonUnit::BqPerM3).await?;
//! assert_eq!(snapshot.number(rd200_core::Metric::Radon), Some(50.0));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use rd200_types::CharacteristicPair;

use crate::commands::{READ_LEVELS, READ_PEAK, READ_UPTIME};
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{Connection, NotificationCallback, Transport};

/// How the mock answers one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Notify this frame while the write is in progress.
    Frame(Vec<u8>),
    /// Never answer.
    Silence,
    /// Notify this frame after a delay, from a background task.
    Delayed(Duration, Vec<u8>),
}

/// A GATT operation recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    /// `connect(address)`.
    Connect(String),
    /// `subscribe(uuid)`.
    Subscribe(Uuid),
    /// `write_characteristic(uuid, bytes)`.
    Write(Uuid, Vec<u8>),
    /// `unsubscribe(uuid)`.
    Unsubscribe(Uuid),
    /// `disconnect()`.
    Disconnect,
    /// `clear_service_cache()`.
    ClearServiceCache,
}

type SharedCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Default)]
struct MockState {
    replies: HashMap<(Uuid, u8), (Uuid, MockReply)>,
    connect_failure: Option<ConnectionFailureReason>,
    connect_delays: VecDeque<Duration>,
    missing: HashSet<Uuid>,
    late_frames: VecDeque<Vec<u8>>,
    subscriptions: HashMap<Uuid, SharedCallback>,
    operations: Vec<MockOp>,
}

/// A scripted [`Transport`].
///
/// Clones share state, so a test can keep one handle for assertions while
/// the session drives another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockTransport")
            .field("replies", &state.replies.len())
            .field("connect_failure", &state.connect_failure)
            .field("operations", &state.operations.len())
            .finish()
    }
}

impl MockTransport {
    /// Start building a mock.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Mock answering the three standard commands with the given frames.
    pub fn standard(levels: Vec<u8>, peak: Vec<u8>, uptime: Vec<u8>) -> Self {
        Self::builder()
            .reply(CharacteristicPair::STANDARD, READ_LEVELS, MockReply::Frame(levels))
            .reply(CharacteristicPair::STANDARD, READ_PEAK, MockReply::Frame(peak))
            .reply(CharacteristicPair::STANDARD, READ_UPTIME, MockReply::Frame(uptime))
            .build()
    }

    /// Mock answering the two `FR:R2` commands with the given frames.
    pub fn legacy(levels: Vec<u8>, peak_uptime: Vec<u8>) -> Self {
        Self::builder()
            .reply(CharacteristicPair::LEGACY, READ_LEVELS, MockReply::Frame(levels))
            .reply(
                CharacteristicPair::LEGACY,
                READ_UPTIME,
                MockReply::Frame(peak_uptime),
            )
            .build()
    }

    /// Every operation performed so far, in order.
    pub fn operations(&self) -> Vec<MockOp> {
        self.lock().operations.clone()
    }

    /// Number of recorded operations matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&MockOp) -> bool) -> usize {
        self.lock().operations.iter().filter(|op| predicate(op)).count()
    }

    /// Forget recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Queue a frame to be pushed at the next subscribe, before any command
    /// has been written.
    pub fn push_late_frame(&self, frame: Vec<u8>) {
        self.lock().late_frames.push_back(frame);
    }

    /// Change how a command is answered.
    pub fn set_reply(&self, pair: CharacteristicPair, opcode: u8, reply: MockReply) {
        self.lock()
            .replies
            .insert((pair.write, opcode), (pair.notify, reply));
    }

    /// Make the next connect take `delay` before it answers.
    pub fn push_slow_connect(&self, delay: Duration) {
        self.lock().connect_delays.push_back(delay);
    }

    /// Make subsequent connects fail, or succeed again with `None`.
    pub fn set_connect_failure(&self, reason: Option<ConnectionFailureReason>) {
        self.lock().connect_failure = reason;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(&self, address: &str) -> Result<MockConnection> {
        let delay = {
            let mut state = self.lock();
            state.operations.push(MockOp::Connect(address.to_string()));
            state.connect_delays.pop_front()
        };
        if let Some(delay) = delay {
            debug!(?delay, "Mock connect stalling");
            tokio::time::sleep(delay).await;
        }

        let failure = self.lock().connect_failure.clone();
        if let Some(reason) = failure {
            return Err(Error::connection_failed(Some(address.to_string()), reason));
        }
        Ok(MockConnection {
            state: Arc::clone(&self.state),
            connected: true,
        })
    }
}

/// Builder for [`MockTransport`].
#[derive(Default)]
pub struct MockTransportBuilder {
    state: MockState,
}

impl MockTransportBuilder {
    /// Answer `opcode` written to `pair.write` on `pair.notify`.
    #[must_use]
    pub fn reply(mut self, pair: CharacteristicPair, opcode: u8, reply: MockReply) -> Self {
        self.state
            .replies
            .insert((pair.write, opcode), (pair.notify, reply));
        self
    }

    /// Fail every connect with `reason`.
    #[must_use]
    pub fn connect_failure(mut self, reason: ConnectionFailureReason) -> Self {
        self.state.connect_failure = Some(reason);
        self
    }

    /// Stall a connect for `delay`. Queued delays apply to successive
    /// connects in order.
    #[must_use]
    pub fn slow_connect(mut self, delay: Duration) -> Self {
        self.state.connect_delays.push_back(delay);
        self
    }

    /// Report `uuid` as absent from the device's GATT table.
    #[must_use]
    pub fn missing_characteristic(mut self, uuid: Uuid) -> Self {
        self.state.missing.insert(uuid);
        self
    }

    /// Push `frame` at the next subscribe, before the command is written.
    #[must_use]
    pub fn late_frame(mut self, frame: Vec<u8>) -> Self {
        self.state.late_frames.push_back(frame);
        self
    }

    /// Build the mock.
    pub fn build(self) -> MockTransport {
        MockTransport {
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

/// Connection handed out by [`MockTransport`].
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    connected: bool,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("connected", &self.connected)
            .finish()
    }
}

impl MockConnection {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn write_characteristic(&mut self, uuid: Uuid, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;

        // Callbacks run without the state lock held.
        let (callback, reply) = {
            let mut state = self.lock();
            state.operations.push(MockOp::Write(uuid, data.to_vec()));
            if state.missing.contains(&uuid) {
                return Err(Error::characteristic_not_found(uuid));
            }

            let scripted = data
                .first()
                .and_then(|opcode| state.replies.get(&(uuid, *opcode)).cloned());
            match scripted {
                Some((notify, reply)) => (state.subscriptions.get(&notify).cloned(), reply),
                None => (None, MockReply::Silence),
            }
        };

        match (callback, reply) {
            (Some(callback), MockReply::Frame(frame)) => callback(&frame),
            (Some(callback), MockReply::Delayed(delay, frame)) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    callback(&frame);
                });
            }
            (None, MockReply::Frame(_) | MockReply::Delayed(..)) => {
                debug!(%uuid, "Mock reply dropped, nobody subscribed");
            }
            (_, MockReply::Silence) => {}
        }

        Ok(())
    }

    async fn subscribe(&mut self, uuid: Uuid, callback: NotificationCallback) -> Result<()> {
        self.ensure_connected()?;

        let callback: SharedCallback = Arc::from(callback);
        let late = {
            let mut state = self.lock();
            state.operations.push(MockOp::Subscribe(uuid));
            if state.missing.contains(&uuid) {
                return Err(Error::characteristic_not_found(uuid));
            }
            state.subscriptions.insert(uuid, Arc::clone(&callback));
            state.late_frames.pop_front()
        };

        if let Some(frame) = late {
            callback(&frame);
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, uuid: Uuid) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(MockOp::Unsubscribe(uuid));
        state.subscriptions.remove(&uuid);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        let mut state = self.lock();
        state.operations.push(MockOp::Disconnect);
        state.subscriptions.clear();
        Ok(())
    }

    async fn clear_service_cache(&mut self) -> Result<()> {
        self.lock().operations.push(MockOp::ClearServiceCache);
        Ok(())
    }
}

/// Builders for device frames.
pub mod frames {
    /// Standard `0x50` reply.
    pub fn standard_levels(now: u16, day: u16, month: u16) -> Vec<u8> {
        standard_levels_with_counts(now, day, month, 0, 0)
    }

    /// Standard `0x50` reply including the pulse counters.
    pub fn standard_levels_with_counts(
        now: u16,
        day: u16,
        month: u16,
        count_now: u16,
        count_last: u16,
    ) -> Vec<u8> {
        let mut frame = vec![0x50, 0x0A];
        for value in [now, day, month, count_now, count_last] {
            frame.extend_from_slice(&value.to_le_bytes());
        }
        frame
    }

    /// Standard `0x40` reply.
    pub fn standard_peak(peak: u16, hw_version: &str, sw_version: &str) -> Vec<u8> {
        let mut frame = vec![0u8; 68];
        frame[0] = 0x40;
        write_text(&mut frame[16..21], hw_version);
        write_text(&mut frame[22..30], sw_version);
        frame[51..53].copy_from_slice(&peak.to_le_bytes());
        frame
    }

    /// Standard `0x51` reply.
    pub fn standard_uptime(minutes: u32) -> Vec<u8> {
        let mut frame = vec![0u8; 16];
        frame[0] = 0x51;
        frame[4..8].copy_from_slice(&minutes.to_le_bytes());
        frame
    }

    /// `FR:R2` `0x50` reply, values in pCi/L.
    pub fn legacy_levels(now: f32, day: f32, month: f32) -> Vec<u8> {
        let mut frame = vec![0x50, 0x0C];
        for value in [now, day, month] {
            frame.extend_from_slice(&value.to_le_bytes());
        }
        frame
    }

    /// `FR:R2` `0x51` reply, peak in pCi/L.
    pub fn legacy_peak_uptime(peak: f32, minutes: u32) -> Vec<u8> {
        let mut frame = vec![0u8; 16];
        frame[0] = 0x51;
        frame[4..8].copy_from_slice(&minutes.to_le_bytes());
        frame[12..16].copy_from_slice(&peak.to_le_bytes());
        frame
    }

    fn write_text(field: &mut [u8], text: &str) {
        let bytes = text.as_bytes();
        let len = bytes.len().min(field.len());
        field[..len].copy_from_slice(&bytes[..len]);
    }
}

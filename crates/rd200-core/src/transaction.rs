//! The command/notification exchange.
//!
//! The RD200 has no request/response correlation on its GATT channel: a
//! command byte is written to one characteristic and the reply is pushed as
//! an unsolicited notification on another. [`execute`] turns that into a
//! single bounded exchange.
//!
//! Each call creates its own one-shot channel. The notification callback
//! installed for the exchange only forwards frames once the exchange is
//! armed (after subscribing, right before the command write) and only the
//! first one; anything earlier, later, or duplicated is dropped. A reply
//! that straggles in after its deadline therefore lands in a closed slot and
//! can never be taken for the answer to the next command.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use rd200_types::CharacteristicPair;

use crate::error::Result;
use crate::traits::Connection;

/// One command of a protocol dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Short name used in logs.
    pub name: &'static str,
    /// Command byte written to the device.
    pub opcode: u8,
    /// Characteristics the command is written to and answered on.
    pub characteristics: CharacteristicPair,
    /// How long to wait for the reply.
    pub deadline: Duration,
}

impl Command {
    /// Describe a command.
    pub fn new(
        name: &'static str,
        opcode: u8,
        characteristics: CharacteristicPair,
        deadline: Duration,
    ) -> Self {
        Self {
            name,
            opcode,
            characteristics,
            deadline,
        }
    }

    /// Bytes written to the device for this command.
    pub fn payload(&self) -> [u8; 1] {
        [self.opcode]
    }
}

/// Payload of exactly one notification.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame(Bytes);

impl RawFrame {
    /// Wrap a notification payload.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The frame contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFrame({} bytes: {:02X?})", self.0.len(), &self.0[..])
    }
}

/// How an exchange ended.
///
/// A frame of the wrong length is still a [`TransactionOutcome::Frame`];
/// the decoder decides what to make of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The device answered.
    Frame(RawFrame),
    /// No notification arrived before the deadline.
    TimedOut,
}

impl TransactionOutcome {
    /// The captured frame, if any.
    pub fn into_frame(self) -> Option<RawFrame> {
        match self {
            TransactionOutcome::Frame(frame) => Some(frame),
            TransactionOutcome::TimedOut => None,
        }
    }

    /// Whether the exchange timed out.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, TransactionOutcome::TimedOut)
    }
}

/// Single-use landing place for the reply of one exchange.
struct FrameSlot {
    armed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<RawFrame>>>,
}

impl FrameSlot {
    fn new(sender: oneshot::Sender<RawFrame>) -> Self {
        Self {
            armed: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn offer(&self, data: &[u8]) {
        if !self.armed.load(Ordering::SeqCst) {
            debug!(len = data.len(), "Discarding notification outside an armed exchange");
            return;
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(tx) => {
                // The receiver is gone once the deadline has passed.
                if tx.send(RawFrame::new(Bytes::copy_from_slice(data))).is_err() {
                    debug!(len = data.len(), "Reply arrived after the exchange gave up");
                }
            }
            None => debug!(len = data.len(), "Discarding duplicate notification"),
        }
    }
}

/// Run one command/notification exchange on `conn`.
///
/// Subscribes to the notify characteristic, writes the command byte, and
/// waits up to the command's deadline for one notification. The
/// subscription is always released before returning.
///
/// A missing reply is [`TransactionOutcome::TimedOut`], not an error.
/// Errors are reserved for the transport itself failing (subscribe, write),
/// which the session cannot paper over.
pub async fn execute(conn: &mut dyn Connection, command: &Command) -> Result<TransactionOutcome> {
    let notify = command.characteristics.notify;
    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(FrameSlot::new(tx));

    let callback_slot = Arc::clone(&slot);
    conn.subscribe(notify, Box::new(move |data| callback_slot.offer(data)))
        .await?;

    slot.arm();
    let result = exchange(conn, command, rx).await;
    slot.disarm();

    let released = conn.unsubscribe(notify).await;

    match (result, released) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(outcome), Err(e)) => {
            warn!(command = command.name, error = %e, "Failed to unsubscribe after exchange");
            Ok(outcome)
        }
        (Err(e), released) => {
            if let Err(unsub) = released {
                debug!(command = command.name, error = %unsub, "Unsubscribe after failed exchange also failed");
            }
            Err(e)
        }
    }
}

async fn exchange(
    conn: &mut dyn Connection,
    command: &Command,
    rx: oneshot::Receiver<RawFrame>,
) -> Result<TransactionOutcome> {
    debug!(
        command = command.name,
        opcode = format_args!("0x{:02X}", command.opcode),
        "Writing command"
    );
    conn.write_characteristic(command.characteristics.write, &command.payload())
        .await?;

    match timeout(command.deadline, rx).await {
        Ok(Ok(frame)) => {
            debug!(command = command.name, ?frame, "Received reply");
            Ok(TransactionOutcome::Frame(frame))
        }
        Ok(Err(_)) => {
            warn!(command = command.name, "Notification channel closed before a reply");
            Ok(TransactionOutcome::TimedOut)
        }
        Err(_) => {
            warn!(
                command = command.name,
                deadline = ?command.deadline,
                "No reply before deadline"
            );
            Ok(TransactionOutcome::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOp, MockReply, MockTransport};
    use crate::traits::Transport;

    fn levels_command() -> Command {
        Command::new(
            "levels",
            crate::commands::READ_LEVELS,
            CharacteristicPair::STANDARD,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_raw_frame_accessors() {
        let frame = RawFrame::new(vec![1u8, 2, 3]);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);
        assert!(format!("{:?}", frame).contains("3 bytes"));
    }

    #[test]
    fn test_slot_ignores_frames_until_armed() {
        let (tx, mut rx) = oneshot::channel();
        let slot = FrameSlot::new(tx);

        slot.offer(&[0xAA]);
        assert!(rx.try_recv().is_err());

        slot.arm();
        slot.offer(&[0x01]);
        slot.offer(&[0x02]);
        assert_eq!(rx.try_recv().unwrap().as_bytes(), &[0x01]);
    }

    #[tokio::test]
    async fn test_execute_returns_frame() {
        let transport = MockTransport::builder()
            .reply(
                CharacteristicPair::STANDARD,
                crate::commands::READ_LEVELS,
                MockReply::Frame(vec![0x50, 0x0A, 0x32, 0x00]),
            )
            .build();
        let mut conn = transport.connect("AA:BB").await.unwrap();

        let outcome = execute(&mut conn, &levels_command()).await.unwrap();
        assert_eq!(
            outcome.into_frame().unwrap().as_bytes(),
            &[0x50, 0x0A, 0x32, 0x00]
        );

        let ops = transport.operations();
        assert_eq!(
            ops[1..],
            [
                MockOp::Subscribe(CharacteristicPair::STANDARD.notify),
                MockOp::Write(CharacteristicPair::STANDARD.write, vec![0x50]),
                MockOp::Unsubscribe(CharacteristicPair::STANDARD.notify),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out_and_unsubscribes() {
        let transport = MockTransport::builder().build();
        let mut conn = transport.connect("AA:BB").await.unwrap();

        let outcome = execute(&mut conn, &levels_command()).await.unwrap();
        assert!(outcome.is_timed_out());
        assert_eq!(
            transport.operations().last(),
            Some(&MockOp::Unsubscribe(CharacteristicPair::STANDARD.notify))
        );
    }

    #[tokio::test]
    async fn test_execute_discards_frame_delivered_before_write() {
        let transport = MockTransport::builder()
            .late_frame(vec![0xFF; 12])
            .reply(
                CharacteristicPair::STANDARD,
                crate::commands::READ_LEVELS,
                MockReply::Frame(vec![0x50; 12]),
            )
            .build();
        let mut conn = transport.connect("AA:BB").await.unwrap();

        let frame = execute(&mut conn, &levels_command())
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(frame.as_bytes(), &[0x50; 12]);
    }

    #[tokio::test]
    async fn test_execute_propagates_missing_characteristic() {
        let transport = MockTransport::builder()
            .missing_characteristic(CharacteristicPair::STANDARD.write)
            .build();
        let mut conn = transport.connect("AA:BB").await.unwrap();

        let err = execute(&mut conn, &levels_command()).await.unwrap_err();
        assert!(err.is_missing_characteristic());
        // Subscription is still released.
        assert_eq!(
            transport.operations().last(),
            Some(&MockOp::Unsubscribe(CharacteristicPair::STANDARD.notify))
        );
    }
}

//! Transport abstractions consumed by the session driver.
//!
//! [`Transport`] and [`Connection`] describe the handful of GATT operations
//! the RD200 protocol needs. The btleplug backend in [`crate::ble`] and the
//! scripted backend in [`crate::mock`] both implement them, so the session
//! logic runs unchanged against real hardware and in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Callback invoked with the payload of every notification on a
/// subscribed characteristic.
pub type NotificationCallback = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Something that can open a link to an RD200 by address.
///
/// # Example
///
/// ```ignore
/// use rd200_core::{Transport, Connection, Result};
///
/// async fn ping<T: Transport>(transport: &T, address: &str) -> Result<()> {
///     let mut conn = transport.connect(address).await?;
///     conn.disconnect().await
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// The live link type this transport hands out.
    type Connection: Connection + 'static;

    /// Open a link to the device at `address`.
    ///
    /// Implementations may retry internally; once this returns `Ok` the link
    /// is treated as reliable for the rest of the session.
    async fn connect(&self, address: &str) -> Result<Self::Connection>;
}

/// A live link to one device.
///
/// All methods take `&mut self`: a connection serves one session and one
/// in-flight transaction at a time.
#[async_trait]
pub trait Connection: Send {
    /// Write `data` to the characteristic `uuid`.
    async fn write_characteristic(&mut self, uuid: Uuid, data: &[u8]) -> Result<()>;

    /// Start delivering notifications on `uuid` to `callback`.
    async fn subscribe(&mut self, uuid: Uuid, callback: NotificationCallback) -> Result<()>;

    /// Stop delivering notifications on `uuid`.
    async fn unsubscribe(&mut self, uuid: Uuid) -> Result<()>;

    /// Close the link.
    async fn disconnect(&mut self) -> Result<()>;

    /// Forget any cached GATT services so the next connect rediscovers them.
    async fn clear_service_cache(&mut self) -> Result<()>;
}

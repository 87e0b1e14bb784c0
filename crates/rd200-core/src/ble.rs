//! btleplug-backed [`Transport`].
//!
//! [`BleTransport`] locates peripherals on the first adapter, connects with
//! a timeout, and discovers GATT services once per address. Each call to
//! [`Transport::connect`] is a single attempt; the session retries it. The discovered peripheral is cached until
//! [`Connection::clear_service_cache`] evicts it, so a device whose
//! characteristics went missing is looked up and rediscovered from scratch on
//! the next connect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{self, ScanOptions};
use crate::traits::{Connection, NotificationCallback, Transport};

/// Default timeout for the radio connect.
///
/// With the single scan pass and discovery this stays inside the session's
/// per-attempt bound.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
/// Default timeout for GATT service discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(4);
/// Default timeout for a characteristic write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for [`BleTransport`].
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Scan settings used to locate peripherals that are not yet known.
    pub scan: ScanOptions,
    /// Timeout for the radio connect.
    pub connect_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
    /// Timeout for characteristic writes.
    pub write_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default().find_attempts(1),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl BleConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan options.
    #[must_use]
    pub fn scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

type PeripheralCache = Arc<Mutex<HashMap<String, Peripheral>>>;

/// Transport over the system Bluetooth adapter.
#[derive(Debug, Clone)]
pub struct BleTransport {
    adapter: Adapter,
    config: BleConfig,
    peripherals: PeripheralCache,
}

impl BleTransport {
    /// Transport on the first available adapter with default settings.
    pub async fn new() -> Result<Self> {
        Self::with_config(BleConfig::default()).await
    }

    /// Transport on the first available adapter.
    pub async fn with_config(config: BleConfig) -> Result<Self> {
        let adapter = scan::get_adapter().await?;
        Ok(Self::with_adapter(adapter, config))
    }

    /// Transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter, config: BleConfig) -> Self {
        Self {
            adapter,
            config,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The adapter in use.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn connect_once(&self, address: &str) -> Result<BleConnection> {
        let cached = self.peripherals.lock().await.get(address).cloned();
        let (peripheral, fresh) = match cached {
            Some(peripheral) => (peripheral, false),
            None => (
                scan::find_peripheral(&self.adapter, address, &self.config.scan).await?,
                true,
            ),
        };

        if !peripheral.is_connected().await.unwrap_or(false) {
            timeout(self.config.connect_timeout, peripheral.connect())
                .await
                .map_err(|_| ConnectionFailureReason::Timeout)
                .and_then(|r| r.map_err(|e| ConnectionFailureReason::from(&e)))
                .map_err(|reason| Error::connection_failed(Some(address.to_string()), reason))?;
        }

        if fresh || peripheral.services().is_empty() {
            debug!(address, "Discovering services");
            let discovered = timeout(self.config.discovery_timeout, peripheral.discover_services())
                .await
                .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))
                .and_then(|r| r.map_err(Error::from));
            if let Err(e) = discovered {
                let _ = peripheral.disconnect().await;
                return Err(e);
            }
        }

        self.peripherals
            .lock()
            .await
            .insert(address.to_string(), peripheral.clone());

        info!(address, "BLE link established");
        Ok(BleConnection {
            address: address.to_string(),
            peripheral,
            write_timeout: self.config.write_timeout,
            peripherals: Arc::clone(&self.peripherals),
            notification_tasks: HashMap::new(),
            disconnected: false,
        })
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Connection = BleConnection;

    async fn connect(&self, address: &str) -> Result<BleConnection> {
        self.connect_once(address).await
    }
}

/// A live btleplug link.
pub struct BleConnection {
    address: String,
    peripheral: Peripheral,
    write_timeout: Duration,
    peripherals: PeripheralCache,
    notification_tasks: HashMap<Uuid, JoinHandle<()>>,
    disconnected: bool,
}

impl std::fmt::Debug for BleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleConnection")
            .field("address", &self.address)
            .field("subscriptions", &self.notification_tasks.len())
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

impl BleConnection {
    /// Address of the connected device.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }

    fn abort_notification_tasks(&mut self) {
        for (_, handle) in self.notification_tasks.drain() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Connection for BleConnection {
    async fn write_characteristic(&mut self, uuid: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.find_characteristic(uuid)?;
        timeout(
            self.write_timeout,
            self.peripheral
                .write(&characteristic, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| Error::timeout(format!("write characteristic {}", uuid), self.write_timeout))?
        .map_err(|e| Error::WriteFailed {
            uuid: uuid.to_string(),
            reason: e.to_string(),
        })
    }

    async fn subscribe(&mut self, uuid: Uuid, callback: NotificationCallback) -> Result<()> {
        let characteristic = self.find_characteristic(uuid)?;

        // Open the stream before enabling notifications so nothing is missed.
        let mut stream = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == uuid {
                    callback(&notification.value);
                }
            }
        });

        if let Some(previous) = self.notification_tasks.insert(uuid, handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, uuid: Uuid) -> Result<()> {
        if let Some(handle) = self.notification_tasks.remove(&uuid) {
            handle.abort();
        }
        let characteristic = self.find_characteristic(uuid)?;
        self.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.abort_notification_tasks();
        self.disconnected = true;
        self.peripheral.disconnect().await?;
        info!(address = %self.address, "BLE link closed");
        Ok(())
    }

    async fn clear_service_cache(&mut self) -> Result<()> {
        self.peripherals.lock().await.remove(&self.address);
        debug!(address = %self.address, "Evicted cached services");
        Ok(())
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        self.abort_notification_tasks();
        if self.disconnected {
            return;
        }

        warn!(
            address = %self.address,
            "Connection dropped without disconnect(), closing in the background"
        );
        let peripheral = self.peripheral.clone();
        let address = self.address.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(address = %address, error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}

//! Device discovery and scanning.
//!
//! Finds RD200 monitors by their advertised local name. Only names that
//! classify as a supported model are reported; everything else in range is
//! ignored.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use rd200_types::ProtocolVariant;

use crate::error::{DeviceNotFoundReason, Error, Result};

/// An RD200 seen during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Advertised local name (e.g. "FR:RD-0001").
    pub name: String,
    /// The peripheral ID for connecting.
    pub id: PeripheralId,
    /// The BLE address as a string (zeros on macOS, use `identifier` instead).
    pub address: String,
    /// Connection identifier (peripheral ID on macOS, address elsewhere).
    pub identifier: String,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
    /// Dialect the device speaks.
    pub variant: ProtocolVariant,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Number of scans [`find_peripheral`] runs before giving up.
    pub find_attempts: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            find_attempts: 3,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(self, secs: u64) -> Self {
        self.duration(Duration::from_secs(secs))
    }

    /// Set how many scans [`find_peripheral`] runs, at least one.
    #[must_use]
    pub fn find_attempts(mut self, attempts: u32) -> Self {
        self.find_attempts = attempts.max(1);
        self
    }

    /// Length of the `attempt`th (1-based) scan run by [`find_peripheral`].
    pub(crate) fn find_scan_duration(&self, attempt: u32) -> Duration {
        (self.duration / 2).max(Duration::from_secs(2)) * attempt
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for RD200 devices in range.
///
/// An empty list means nothing was found; it is not an error.
pub async fn scan_for_devices(options: ScanOptions) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan for RD200 devices using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    info!("Starting BLE scan for {:?}...", options.duration);

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match classify_peripheral(&peripheral).await {
            Ok(Some(device)) => {
                info!(name = %device.name, variant = %device.variant, "Found RD200");
                discovered.push(device);
            }
            Ok(None) => {}
            Err(e) => debug!("Error reading peripheral properties: {}", e),
        }
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

async fn classify_peripheral(peripheral: &Peripheral) -> Result<Option<DiscoveredDevice>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    let Some(name) = properties.local_name else {
        return Ok(None);
    };
    let Some(variant) = ProtocolVariant::from_name(&name) else {
        return Ok(None);
    };

    let id = peripheral.id();
    let address = properties.address.to_string();
    let identifier = create_identifier(&address, &id);

    Ok(Some(DiscoveredDevice {
        name,
        id,
        address,
        identifier,
        rssi: properties.rssi,
        variant,
    }))
}

/// Find a peripheral by address, peripheral ID, or name.
///
/// Peripherals the adapter already knows are checked first. Otherwise up to
/// `options.find_attempts` scans of growing length are run, since
/// advertisements are easily missed on a single pass.
pub async fn find_peripheral(
    adapter: &Adapter,
    identifier: &str,
    options: &ScanOptions,
) -> Result<Peripheral> {
    let identifier_lower = identifier.to_lowercase();

    if let Some(peripheral) = match_known_peripheral(adapter, &identifier_lower).await? {
        debug!("Found {} without scanning", identifier);
        return Ok(peripheral);
    }

    let attempts = options.find_attempts.max(1);
    for attempt in 1..=attempts {
        let scan_duration = options.find_scan_duration(attempt);
        info!(
            "Scan attempt {}/{} ({:?}) for {}",
            attempt, attempts, scan_duration, identifier
        );

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = match_known_peripheral(adapter, &identifier_lower).await? {
            return Ok(peripheral);
        }
    }

    warn!("Device not found after {} attempts: {}", attempts, identifier);
    Err(Error::device_not_found(identifier))
}

async fn match_known_peripheral(
    adapter: &Adapter,
    identifier_lower: &str,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let address = props.address.to_string().to_lowercase();
        let peripheral_id = format_peripheral_id(&peripheral.id()).to_lowercase();

        if peripheral_id == identifier_lower
            || matches_address(&address, identifier_lower)
            || props
                .local_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase() == identifier_lower)
        {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

/// Compare MAC addresses, ignoring separators. The all-zero macOS
/// placeholder never matches.
fn matches_address(address_lower: &str, identifier_lower: &str) -> bool {
    address_lower != "00:00:00:00:00:00"
        && address_lower.replace(':', "") == identifier_lower.replace([':', '-'], "")
}

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs; elsewhere they wrap the address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Identifier to connect with: the address, or the peripheral ID where the
/// platform hides addresses.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_options_builder() {
        assert_eq!(ScanOptions::default().duration, Duration::from_secs(5));
        assert_eq!(ScanOptions::default().find_attempts, 3);
        assert_eq!(ScanOptions::new().find_attempts(0).find_attempts, 1);
        assert_eq!(
            ScanOptions::new().duration_secs(12).duration,
            Duration::from_secs(12)
        );
    }

    #[test]
    fn test_find_scans_grow_per_attempt() {
        let options = ScanOptions::default();
        assert_eq!(options.find_scan_duration(1), Duration::from_millis(2500));
        assert_eq!(options.find_scan_duration(3), Duration::from_millis(7500));
        // Short scans are padded to two seconds.
        let short = ScanOptions::new().duration_secs(1);
        assert_eq!(short.find_scan_duration(1), Duration::from_secs(2));
    }

    #[test]
    fn test_matches_address() {
        assert!(matches_address("aa:bb:cc:dd:ee:ff", "aa:bb:cc:dd:ee:ff"));
        assert!(matches_address("aa:bb:cc:dd:ee:ff", "aabbccddeeff"));
        assert!(matches_address("aa:bb:cc:dd:ee:ff", "aa-bb-cc-dd-ee-ff"));
        assert!(!matches_address("aa:bb:cc:dd:ee:ff", "aa:bb:cc:dd:ee:00"));
        assert!(!matches_address("00:00:00:00:00:00", "000000000000"));
    }
}

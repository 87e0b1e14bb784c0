//! Core types for RD200 radon monitor data.

use core::fmt;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uuid::{LEGACY_READ, LEGACY_WRITE, STANDARD_READ, STANDARD_WRITE};

/// Conversion factor from Bq/m³ to pCi/L (1 pCi/L = 37 Bq/m³).
pub const BQ_TO_PCI_MULTIPLIER: f64 = 1.0 / 37.0;

/// Advertised name prefixes of the supported RD200 models.
///
/// A device whose local name does not start with one of these is not
/// handled by this driver.
pub const SUPPORTED_PREFIXES: [&str; 9] = [
    "FR:RU", "FR:RE", "FR:GI", "FR:H", "FR:R2", "FR:RD", "FR:GL", "FR:GJ", "FR:I",
];

/// Name prefix of the first-generation firmware that speaks the legacy dialect.
pub const LEGACY_R2_PREFIX: &str = "FR:R2";

/// Protocol dialect spoken by a device.
///
/// The dialect decides both the command characteristics and the frame
/// layouts. It is selected once per session from the advertised name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProtocolVariant {
    /// Current firmware: u16 Bq/m³ fields, three separate exchanges.
    Standard,
    /// `FR:R2` firmware: f32 pCi/L fields on the legacy characteristics.
    LegacyR2,
}

impl ProtocolVariant {
    /// Classify a device from its advertised local name.
    ///
    /// Returns `None` for names outside the supported prefix list.
    ///
    /// # Examples
    ///
    /// ```
    /// use rd200_types::ProtocolVariant;
    ///
    /// assert_eq!(ProtocolVariant::from_name("FR:R2-1234"), Some(ProtocolVariant::LegacyR2));
    /// assert_eq!(ProtocolVariant::from_name("FR:RD-9999"), Some(ProtocolVariant::Standard));
    /// assert_eq!(ProtocolVariant::from_name("Other"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if !SUPPORTED_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            return None;
        }

        if name.starts_with(LEGACY_R2_PREFIX) {
            Some(ProtocolVariant::LegacyR2)
        } else {
            Some(ProtocolVariant::Standard)
        }
    }

    /// The write/notify characteristic pair this dialect talks on.
    #[must_use]
    pub fn characteristics(self) -> CharacteristicPair {
        match self {
            ProtocolVariant::Standard => CharacteristicPair::STANDARD,
            ProtocolVariant::LegacyR2 => CharacteristicPair::LEGACY,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Standard => write!(f, "standard"),
            ProtocolVariant::LegacyR2 => write!(f, "legacy-r2"),
        }
    }
}

/// The characteristic a command is written to and the one its reply is
/// notified on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicPair {
    /// Characteristic receiving the command byte.
    pub write: Uuid,
    /// Characteristic notifying the reply frame.
    pub notify: Uuid,
}

impl CharacteristicPair {
    /// Characteristics used by current firmware.
    pub const STANDARD: Self = Self {
        write: STANDARD_WRITE,
        notify: STANDARD_READ,
    };

    /// Characteristics used by `FR:R2` firmware.
    pub const LEGACY: Self = Self {
        write: LEGACY_WRITE,
        notify: LEGACY_READ,
    };
}

/// Unit radon concentrations are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RadonUnit {
    /// Becquerels per cubic metre (metric).
    #[default]
    BqPerM3,
    /// Picocuries per litre (US customary).
    PciPerL,
}

impl RadonUnit {
    /// Pick the unit for a metric or non-metric unit system.
    #[must_use]
    pub fn from_metric(is_metric: bool) -> Self {
        if is_metric {
            RadonUnit::BqPerM3
        } else {
            RadonUnit::PciPerL
        }
    }

    /// Whether this is the metric unit.
    #[must_use]
    pub fn is_metric(self) -> bool {
        matches!(self, RadonUnit::BqPerM3)
    }

    /// Display symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            RadonUnit::BqPerM3 => "Bq/m³",
            RadonUnit::PciPerL => "pCi/L",
        }
    }

    /// Express a Bq/m³ value in this unit, rounded to 2 decimals.
    #[must_use]
    pub fn from_bq(self, bq: f64) -> f64 {
        match self {
            RadonUnit::BqPerM3 => round_hundredths(bq),
            RadonUnit::PciPerL => round_hundredths(bq * BQ_TO_PCI_MULTIPLIER),
        }
    }

    /// Express a pCi/L value in this unit, rounded to 2 decimals.
    #[must_use]
    pub fn from_pci(self, pci: f64) -> f64 {
        match self {
            RadonUnit::BqPerM3 => round_hundredths(pci / BQ_TO_PCI_MULTIPLIER),
            RadonUnit::PciPerL => round_hundredths(pci),
        }
    }
}

impl fmt::Display for RadonUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Round to 2 decimal places.
#[must_use]
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Time since the monitor was powered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Uptime {
    /// Whole minutes.
    pub minutes: u32,
    /// Sub-minute precision in milliseconds, 0 when the firmware does not report it.
    pub millis: u32,
}

impl Uptime {
    /// Uptime from whole minutes only.
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes, millis: 0 }
    }

    /// Total uptime in seconds.
    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        f64::from(self.minutes) * 60.0 + f64::from(self.millis) / 1000.0
    }

    /// Whole days.
    #[must_use]
    pub fn days(&self) -> u32 {
        self.minutes / 1440
    }

    /// Hours within the current day.
    #[must_use]
    pub fn hours(&self) -> u32 {
        (self.minutes % 1440) / 60
    }

    /// Minutes within the current hour.
    #[must_use]
    pub fn mins(&self) -> u32 {
        (self.minutes % 1440) % 60
    }

    /// Seconds term derived from the millisecond field.
    #[must_use]
    pub fn secs(&self) -> u32 {
        self.millis / 1000
    }
}

/// Formats as `"{days}d {HH}:{MM}:{SS}"`, e.g. `"1d 01:00:00"`.
impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {:02}:{:02}:{:02}",
            self.days(),
            self.hours(),
            self.mins(),
            self.secs()
        )
    }
}

/// A metric reported in a [`DeviceSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Metric {
    /// Current radon concentration.
    Radon,
    /// Peak radon concentration.
    RadonPeak,
    /// 1-day average.
    #[cfg_attr(feature = "serde", serde(rename = "radon_1day_level"))]
    Radon1DayLevel,
    /// 1-month average.
    #[cfg_attr(feature = "serde", serde(rename = "radon_1month_level"))]
    Radon1MonthLevel,
    /// Uptime in seconds.
    RadonUptime,
    /// Uptime as `"Dd HH:MM:SS"`.
    RadonUptimeString,
    /// Raw pulse counter, current window.
    RadonCNow,
    /// Raw pulse counter, previous window.
    RadonCLast,
}

impl Metric {
    /// Every metric, in display order.
    pub const ALL: [Metric; 8] = [
        Metric::Radon,
        Metric::RadonPeak,
        Metric::Radon1DayLevel,
        Metric::Radon1MonthLevel,
        Metric::RadonUptime,
        Metric::RadonUptimeString,
        Metric::RadonCNow,
        Metric::RadonCLast,
    ];

    /// Snapshot key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Metric::Radon => "radon",
            Metric::RadonPeak => "radon_peak",
            Metric::Radon1DayLevel => "radon_1day_level",
            Metric::Radon1MonthLevel => "radon_1month_level",
            Metric::RadonUptime => "radon_uptime",
            Metric::RadonUptimeString => "radon_uptime_string",
            Metric::RadonCNow => "radon_c_now",
            Metric::RadonCLast => "radon_c_last",
        }
    }

    /// Look a metric up by its snapshot key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Metric::Radon => "Radon",
            Metric::RadonPeak => "Radon Peak",
            Metric::Radon1DayLevel => "Radon 1-day Level",
            Metric::Radon1MonthLevel => "Radon 1-month Level",
            Metric::RadonUptime => "Radon Uptime",
            Metric::RadonUptimeString => "Radon Uptime String",
            Metric::RadonCNow => "Radon Counts Now",
            Metric::RadonCLast => "Radon Counts Last",
        }
    }

    /// Whether the metric is a radon concentration.
    #[must_use]
    pub fn is_concentration(self) -> bool {
        matches!(
            self,
            Metric::Radon | Metric::RadonPeak | Metric::Radon1DayLevel | Metric::Radon1MonthLevel
        )
    }

    /// Unit of the metric's value, if it has one.
    #[must_use]
    pub fn unit(self, radon_unit: RadonUnit) -> Option<&'static str> {
        match self {
            m if m.is_concentration() => Some(radon_unit.symbol()),
            Metric::RadonUptime => Some("s"),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Value of a metric.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetricValue {
    /// A numeric reading.
    Number(f64),
    /// A textual reading.
    Text(String),
}

impl MetricValue {
    /// The numeric value, if this is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }

    /// The text value, if this is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Number(_) => None,
            MetricValue::Text(s) => Some(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Values decoded from one exchange, ready to merge into a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotUpdate {
    /// Decoded metrics. Metrics that could not be decoded are left out.
    pub metrics: Vec<(Metric, MetricValue)>,
    /// Hardware version text, if the exchange carried it.
    pub hw_version: Option<String>,
    /// Software version text, if the exchange carried it.
    pub sw_version: Option<String>,
}

impl SnapshotUpdate {
    /// An update with nothing in it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a metric.
    #[must_use]
    pub fn with(mut self, metric: Metric, value: impl Into<MetricValue>) -> Self {
        self.metrics.push((metric, value.into()));
        self
    }

    /// Whether the update carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.hw_version.is_none() && self.sw_version.is_none()
    }
}

/// Latest state read from one RD200 in one session.
///
/// Metrics missing from [`sensors`](Self::sensors) were not measured this
/// session. A missing metric is never the same as a reading of zero.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSnapshot {
    /// Device address (MAC address, or a CoreBluetooth UUID on macOS).
    pub address: String,
    /// Advertised local name.
    pub name: String,
    /// Free-form identifier chosen by the caller, defaults to the name.
    pub identifier: String,
    /// Hardware version, empty until read.
    pub hw_version: String,
    /// Software version, empty until read.
    pub sw_version: String,
    /// Dialect the session used.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub variant: Option<ProtocolVariant>,
    /// Unit of the concentration metrics.
    pub unit: RadonUnit,
    /// Measured metrics.
    pub sensors: BTreeMap<Metric, MetricValue>,
    /// When the session finished.
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub captured_at: Option<time::OffsetDateTime>,
}

impl DeviceSnapshot {
    /// Empty snapshot for a device.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            address: address.into(),
            identifier: name.clone(),
            name,
            ..Self::default()
        }
    }

    /// Value of a metric, `None` when it was not measured.
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<&MetricValue> {
        self.sensors.get(&metric)
    }

    /// Numeric value of a metric.
    #[must_use]
    pub fn number(&self, metric: Metric) -> Option<f64> {
        self.get(metric).and_then(MetricValue::as_f64)
    }

    /// Whether a metric was measured.
    #[must_use]
    pub fn has(&self, metric: Metric) -> bool {
        self.sensors.contains_key(&metric)
    }

    /// Record a metric unless it is already set.
    ///
    /// Returns `false` when an earlier value was kept.
    pub fn record(&mut self, metric: Metric, value: MetricValue) -> bool {
        match self.sensors.entry(metric) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Merge an exchange's values without overwriting anything already set.
    pub fn merge(&mut self, update: SnapshotUpdate) {
        for (metric, value) in update.metrics {
            self.record(metric, value);
        }
        if let Some(hw) = update.hw_version
            && self.hw_version.is_empty()
        {
            self.hw_version = hw;
        }
        if let Some(sw) = update.sw_version
            && self.sw_version.is_empty()
        {
            self.sw_version = sw;
        }
    }
}

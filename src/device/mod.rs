use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

mod config;
mod user;

pub use config::{BaseConfig, BaseMethod, BaseSetup, Coordinates, ServiceConfig, StreamTarget};
pub use user::{CurrentUser, User, UserDraft};

/// Server assigned [Device] state. The client never transitions
/// this itself, it only reacts to it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Unprovisioned,
    AwaitingLicense,
    Configuring,
    Online,
    #[default]
    Offline,
    Rebooting,
    RebootingForReset,
    Locked,
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    /// Short label used by list items and panel badges
    pub fn label(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Unprovisioned => "UNPROVISIONED",
            Self::AwaitingLicense => "AWAITING LICENSE",
            Self::Configuring => "CONFIGURING",
            Self::Rebooting => "REBOOTING",
            Self::RebootingForReset => "RESETTING",
            Self::Locked => "LOCKED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// True for states in which the station streams corrections
    /// and accepts configuration.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Online | Self::Configuring)
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One CORS base station, as published by the server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable unique identifier
    #[serde(default, deserialize_with = "nullable")]
    pub serial: String,

    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub status: DeviceStatus,

    #[serde(default, deserialize_with = "nullable")]
    pub ntrip_connected: bool,

    /// Correction stream throughput (bytes/s)
    #[serde(default, deserialize_with = "nullable")]
    pub bps: u64,

    #[serde(default)]
    pub detected_chip_type: Option<String>,

    #[serde(default, deserialize_with = "loose")]
    pub base_config: BaseConfig,

    #[serde(default, deserialize_with = "loose")]
    pub service_config: ServiceConfig,

    #[serde(default, deserialize_with = "nullable")]
    pub is_locked: bool,

    #[serde(default)]
    pub user_id: Option<i64>,

    #[serde(default, deserialize_with = "nullable")]
    pub timestamp: i64,
}

impl Device {
    /// Detected GNSS chip, or "UNKNOWN"
    pub fn chip_type(&self) -> &str {
        match self.detected_chip_type.as_deref() {
            Some(chip) if !chip.is_empty() => chip,
            _ => "UNKNOWN",
        }
    }

    /// Returns true if `other` differs from [Self] on any field
    /// that drives the configuration surface selection.
    pub fn config_differs(&self, other: &Self) -> bool {
        self.status != other.status
            || self.base_config != other.base_config
            || self.service_config != other.service_config
    }

    /// Throughput summary, as shown in the device list
    pub fn throughput(&self) -> String {
        if self.status == DeviceStatus::Online && self.ntrip_connected {
            if self.bps > 0 {
                format!("{} B/s", self.bps)
            } else {
                "Sending...".to_string()
            }
        } else {
            "0 B/s".to_string()
        }
    }
}

/// Server side fields are frequently `null`: decode them as their default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Free-form objects relayed from the stations: anything that does not
/// decode as `T` is replaced by its default.
pub(crate) fn loose<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Loosely typed scalar: numbers given as strings and strings given as
/// numbers both decode. Values that still do not fit decode as None.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + FromStr,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => s.parse().ok().or_else(|| s.trim().parse().ok()),
        Value::Number(n) => n.to_string().parse().ok(),
        other => serde_json::from_value(other).ok(),
    })
}

/// Optional nested record: None when it does not decode
pub(crate) fn lenient_record<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => serde_json::from_value(other).ok(),
    })
}

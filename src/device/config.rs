use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{lenient, lenient_record};

/// Base position determination method
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseMethod {
    /// Operator supplied coordinates
    #[default]
    #[serde(rename = "FIXED_LLA")]
    FixedLla,

    /// Self determined position (Survey-In)
    #[serde(rename = "SURVEY_IN")]
    SurveyIn,
}

impl std::fmt::Display for BaseMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedLla => write!(f, "FIXED_LLA"),
            Self::SurveyIn => write!(f, "SURVEY_IN"),
        }
    }
}

impl FromStr for BaseMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "FIXED_LLA" => Ok(Self::FixedLla),
            "SURVEY_IN" => Ok(Self::SurveyIn),
            other => Err(format!("unknown base setup method \"{}\"", other)),
        }
    }
}

/// Geodetic coordinates: decimal degrees and meters
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, deserialize_with = "lenient")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub alt: Option<f64>,
}

/// GNSS base configuration currently applied on a station.
/// An empty object means the station was never configured.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub base_setup_method: Option<BaseMethod>,

    #[serde(
        default,
        deserialize_with = "lenient_record",
        skip_serializing_if = "Option::is_none"
    )]
    pub coords: Option<Coordinates>,

    /// Fixed position accuracy (m)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    /// Survey-In duration (s)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub survey_in_duration: Option<u32>,

    /// Survey-In accuracy target (m)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub survey_in_accuracy: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BaseConfig {
    pub fn is_empty(&self) -> bool {
        self.base_setup_method.is_none()
            && self.coords.is_none()
            && self.accuracy.is_none()
            && self.survey_in_duration.is_none()
            && self.survey_in_accuracy.is_none()
            && self.extra.is_empty()
    }
}

/// Operator request to (re)configure the base position of a station.
/// Accuracies are expressed in millimeters, as typed by the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseSetup {
    FixedLla {
        lat: f64,
        lon: f64,
        alt: f64,
        accuracy_mm: f64,
    },
    SurveyIn {
        duration_s: u32,
        accuracy_mm: f64,
    },
}

impl BaseSetup {
    pub fn method(&self) -> BaseMethod {
        match self {
            Self::FixedLla { .. } => BaseMethod::FixedLla,
            Self::SurveyIn { .. } => BaseMethod::SurveyIn,
        }
    }

    /// Verifies operator input, prior to any request
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::FixedLla {
                lat,
                lon,
                alt,
                accuracy_mm,
            } => {
                if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                    return Err(format!("invalid latitude: {}", lat));
                }
                if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                    return Err(format!("invalid longitude: {}", lon));
                }
                if !alt.is_finite() {
                    return Err(format!("invalid altitude: {}", alt));
                }
                if !accuracy_mm.is_finite() || accuracy_mm <= 0.0 {
                    return Err(format!("invalid accuracy: {} mm", accuracy_mm));
                }
            },
            Self::SurveyIn {
                duration_s,
                accuracy_mm,
            } => {
                if duration_s == 0 {
                    return Err("survey-in duration must be positive".to_string());
                }
                if !accuracy_mm.is_finite() || accuracy_mm <= 0.0 {
                    return Err(format!("invalid accuracy: {} mm", accuracy_mm));
                }
            },
        }
        Ok(())
    }

    /// Builds the CONFIGURE_CHIP payload for a chip of given type
    pub fn to_payload(&self, sensor_type: &str) -> Value {
        let params = match *self {
            Self::FixedLla {
                lat,
                lon,
                alt,
                accuracy_mm,
            } => json!({
                "base_setup_method": BaseMethod::FixedLla,
                "coords": { "lat": lat, "lon": lon, "alt": alt },
                "accuracy": accuracy_mm / 1000.0,
            }),
            Self::SurveyIn {
                duration_s,
                accuracy_mm,
            } => json!({
                "base_setup_method": BaseMethod::SurveyIn,
                "survey_in_duration": duration_s,
                "survey_in_accuracy": accuracy_mm / 1000.0,
            }),
        };

        json!({
            "sensor_type": sensor_type,
            "mode": "BASE",
            "params": params,
        })
    }
}

/// One outbound (caster) or inbound (RTCM client) stream endpoint
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StreamTarget {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mountpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Output services configuration: up to two NTRIP caster targets
/// and one RTCM input client. Mirrors the flat wire layout.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Station identifier
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ncomport: Option<String>,

    /// Caster reconnection interval (s)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reconnectioninterval: Option<u32>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub server1_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub serverhost1: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub port1: Option<u16>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub mountpoint1: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub password1: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub server2_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub serverhost2: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub port2: Option<u16>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub mountpoint2: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub password2: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rtcm_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rtcmserver1: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rtcmport1: Option<u16>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rtcmmountpoint1: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rtcmusername1: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rtcmpassword1: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceConfig {
    /// Default caster reconnection interval (s)
    pub const DEFAULT_RECONNECTION_INTERVAL: u32 = 10;

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the two NTRIP caster targets
    pub fn casters(&self) -> [StreamTarget; 2] {
        [
            StreamTarget {
                enabled: self.server1_enabled.unwrap_or(false),
                host: self.serverhost1.clone(),
                port: self.port1,
                mountpoint: self.mountpoint1.clone(),
                username: None,
                password: self.password1.clone(),
            },
            StreamTarget {
                enabled: self.server2_enabled.unwrap_or(false),
                host: self.serverhost2.clone(),
                port: self.port2,
                mountpoint: self.mountpoint2.clone(),
                username: None,
                password: self.password2.clone(),
            },
        ]
    }

    /// Returns the RTCM input client target
    pub fn rtcm_input(&self) -> StreamTarget {
        StreamTarget {
            enabled: self.rtcm_enabled.unwrap_or(false),
            host: self.rtcmserver1.clone(),
            port: self.rtcmport1,
            mountpoint: self.rtcmmountpoint1.clone(),
            username: self.rtcmusername1.clone(),
            password: self.rtcmpassword1.clone(),
        }
    }

    /// Verifies that every enabled target is reachable
    pub fn validate(&self) -> Result<(), String> {
        let named = self
            .casters()
            .into_iter()
            .enumerate()
            .map(|(i, target)| (format!("caster server {}", i + 1), target))
            .chain(std::iter::once(("RTCM input".to_string(), self.rtcm_input())));

        for (name, target) in named {
            if !target.enabled {
                continue;
            }
            if target.host.as_deref().is_none_or(|host| host.trim().is_empty()) {
                return Err(format!("{} is enabled but has no host", name));
            }
            if target.port.is_none_or(|port| port == 0) {
                return Err(format!("{} is enabled but has no port", name));
            }
        }
        Ok(())
    }
}

use std::str::FromStr;

use crate::device::{Device, DeviceStatus};

/// Configuration surface presented for the selected station
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Surface {
    /// License issuance
    License,

    /// Station naming
    Provisioning,

    /// GNSS base position
    BaseConfig,

    /// Output services (casters, RTCM input)
    ServiceConfig,

    /// Live telemetry
    Dashboard,
}

impl Surface {
    /// Surface a station should land on, given its current state.
    /// None when the state does not call for any particular surface.
    pub fn preferred(device: &Device) -> Option<Self> {
        match device.status {
            DeviceStatus::AwaitingLicense => Some(Self::License),
            DeviceStatus::Unprovisioned => Some(Self::Provisioning),
            status if status.is_operational() => {
                if device.base_config.is_empty() {
                    Some(Self::BaseConfig)
                } else if device.service_config.is_empty() {
                    Some(Self::ServiceConfig)
                } else {
                    Some(Self::Dashboard)
                }
            },
            _ => None,
        }
    }

    /// Surfaces the operator may switch to, in tab order
    pub fn offered(status: DeviceStatus) -> &'static [Self] {
        match status {
            DeviceStatus::AwaitingLicense => &[Self::License],
            DeviceStatus::Unprovisioned => &[Self::Provisioning],
            status if status.is_operational() => {
                &[Self::BaseConfig, Self::ServiceConfig, Self::Dashboard]
            },
            _ => &[],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::License => "License",
            Self::Provisioning => "Provisioning",
            Self::BaseConfig => "GNSS",
            Self::ServiceConfig => "Services",
            Self::Dashboard => "Dashboard",
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "license" => Ok(Self::License),
            "provision" | "provisioning" => Ok(Self::Provisioning),
            "gnss" | "chip" | "base" => Ok(Self::BaseConfig),
            "service" | "services" => Ok(Self::ServiceConfig),
            "dashboard" => Ok(Self::Dashboard),
            other => Err(format!("unknown surface \"{}\"", other)),
        }
    }
}

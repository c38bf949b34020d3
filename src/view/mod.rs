//! Pure rendition of a [Snapshot]: nothing in here performs I/O.
use crate::{
    channel::ConnectionState,
    device::{BaseConfig, BaseMethod, CurrentUser, Device, DeviceStatus, ServiceConfig, StreamTarget},
    state::{Snapshot, Surface},
};

pub mod terminal;

/// Everything on screen
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTree {
    pub header: Header,
    pub devices: DeviceList,
    pub details: Details,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub station_count: usize,

    /// "name (ROLE)"
    pub user: Option<String>,

    pub can_export: bool,
    pub can_manage_users: bool,

    pub link: ConnectionState,

    /// Live channel open and latest request reached the server
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceList {
    Empty,
    Items(Vec<DeviceItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceItem {
    pub serial: String,
    pub name: String,
    pub status: &'static str,
    pub throughput: String,
    pub ntrip_connected: bool,
    pub chip: String,
    pub locked: bool,
    pub selected: bool,
}

impl DeviceItem {
    fn new(device: &Device, selected: bool) -> Self {
        Self {
            selected,
            serial: device.serial.clone(),
            name: device.name.clone(),
            status: device.status.label(),
            throughput: device.throughput(),
            ntrip_connected: device.ntrip_connected,
            chip: device.chip_type().to_string(),
            locked: device.is_locked,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Details {
    /// Nothing selected
    Placeholder,

    /// Blocking interstitial while the station wipes itself
    ResetInProgress { name: String, serial: String },

    Station(Box<StationPanel>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationPanel {
    pub name: String,
    pub serial: String,
    pub status: &'static str,
    pub locked: bool,
    pub chip: String,
    pub tabs: Vec<Tab>,
    pub content: Content,
    pub admin_action: AdminAction,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Tab {
    pub surface: Surface,
    pub active: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AdminAction {
    Lock,
    Unlock,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    None,
    License { serial: String },
    Provisioning { name: String },
    BaseConfig(BaseForm),
    ServiceConfig(ServiceForm),
    Dashboard,
}

/// Base position form, prefilled from the current configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BaseForm {
    pub method: BaseMethod,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy_mm: f64,
    pub survey_in_duration: u32,
}

impl BaseForm {
    pub const DEFAULT_ACCURACY_MM: f64 = 10.0;
    pub const DEFAULT_SURVEY_IN_DURATION: u32 = 300;

    pub fn prefill(config: &BaseConfig) -> Self {
        let coords = config.coords.unwrap_or_default();
        Self {
            method: config.base_setup_method.unwrap_or(BaseMethod::FixedLla),
            latitude: coords.lat,
            longitude: coords.lon,
            altitude: coords.alt,
            accuracy_mm: config
                .accuracy
                .or(config.survey_in_accuracy)
                .map(|meters| meters * 1000.0)
                .unwrap_or(Self::DEFAULT_ACCURACY_MM),
            survey_in_duration: config
                .survey_in_duration
                .unwrap_or(Self::DEFAULT_SURVEY_IN_DURATION),
        }
    }
}

/// Output services form, prefilled from the current configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceForm {
    pub ncomport: String,
    pub reconnection_interval: u32,
    pub casters: [StreamTarget; 2],
    pub rtcm_input: StreamTarget,
}

impl ServiceForm {
    pub fn prefill(config: &ServiceConfig) -> Self {
        Self {
            ncomport: config.ncomport.clone().unwrap_or_default(),
            reconnection_interval: config
                .reconnectioninterval
                .unwrap_or(ServiceConfig::DEFAULT_RECONNECTION_INTERVAL),
            casters: config.casters(),
            rtcm_input: config.rtcm_input(),
        }
    }
}

fn content(device: &Device, surface: Option<Surface>) -> Content {
    match surface {
        None => Content::None,
        Some(Surface::License) => Content::License {
            serial: device.serial.clone(),
        },
        Some(Surface::Provisioning) => Content::Provisioning {
            name: device.name.clone(),
        },
        Some(Surface::BaseConfig) => Content::BaseConfig(BaseForm::prefill(&device.base_config)),
        Some(Surface::ServiceConfig) => {
            Content::ServiceConfig(ServiceForm::prefill(&device.service_config))
        },
        Some(Surface::Dashboard) => Content::Dashboard,
    }
}

fn details(snapshot: &Snapshot) -> Details {
    let Some(device) = snapshot.selected_device() else {
        return Details::Placeholder;
    };

    if device.status == DeviceStatus::RebootingForReset {
        return Details::ResetInProgress {
            name: device.name.clone(),
            serial: device.serial.clone(),
        };
    }

    let surface = snapshot.surface();

    let tabs = Surface::offered(device.status)
        .iter()
        .map(|offered| Tab {
            surface: *offered,
            active: surface == Some(*offered),
        })
        .collect();

    Details::Station(Box::new(StationPanel {
        tabs,
        name: device.name.clone(),
        serial: device.serial.clone(),
        status: device.status.label(),
        locked: device.is_locked,
        chip: device.chip_type().to_string(),
        content: content(device, surface),
        admin_action: if device.is_locked {
            AdminAction::Unlock
        } else {
            AdminAction::Lock
        },
    }))
}

/// Renders a [Snapshot]
pub fn render(snapshot: &Snapshot) -> ViewTree {
    let user = snapshot.user.as_deref();

    let header = Header {
        station_count: snapshot.devices.len(),
        user: user.map(CurrentUser::display_name),
        can_export: user.is_some_and(|u| u.has_permission(CurrentUser::EXPORT_DATA)),
        can_manage_users: user.is_some_and(|u| u.has_permission(CurrentUser::MANAGE_USERS)),
        link: snapshot.link,
        online: snapshot.link.is_open() && !snapshot.gateway_unreachable,
    };

    let selected = snapshot.selected_serial();

    let devices = if snapshot.devices.is_empty() {
        DeviceList::Empty
    } else {
        DeviceList::Items(
            snapshot
                .devices
                .devices()
                .map(|device| DeviceItem::new(device, selected == Some(device.serial.as_str())))
                .collect(),
        )
    };

    ViewTree {
        header,
        devices,
        details: details(snapshot),
    }
}

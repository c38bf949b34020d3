//! Client side state: one immutable [Snapshot] per applied [Event].
use std::sync::Arc;

use hifitime::prelude::Epoch;
use log::{debug, warn};

mod store;
mod surface;
mod telemetry;

pub use store::DeviceStore;
pub use surface::Surface;
pub use telemetry::{NmeaRecord, TelemetryFrame};

use crate::{
    channel::{ConnectionState, Update},
    device::{CurrentUser, Device},
    notice::Notice,
};

/// Everything the controller can be told about
#[derive(Debug, Clone)]
pub enum Event {
    /// Bulk device list, from REST
    Loaded(Vec<Device>),

    /// Decoded live channel message
    Live(Update),

    /// Live channel state change
    Link(ConnectionState),

    /// Gateway reachability, as observed by the latest request
    Reachable(bool),

    /// Operator (de)selects a station
    Select(Option<String>),

    /// Operator switches surface
    Choose(Surface),

    /// Local delete confirmation, after a successful DELETE
    Removed(String),

    /// Authenticated operator
    User(CurrentUser),
}

/// Currently selected station
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub serial: String,

    /// Surface presented, if any
    pub surface: Option<Surface>,

    /// `config_version` the surface was derived from
    derived_from: Option<u64>,
}

impl Selection {
    fn new(serial: String) -> Self {
        Self {
            serial,
            surface: None,
            derived_from: None,
        }
    }
}

/// Result of a state changing [Event]
#[derive(Debug, Clone)]
pub struct Transition {
    pub snapshot: Snapshot,
    pub notice: Option<Notice>,
}

/// Immutable client state. Large members are shared and copied on write,
/// so cloning a [Snapshot] is cheap.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    /// Incremented on each applied [Event]
    pub version: u64,

    pub devices: Arc<DeviceStore>,

    pub selection: Option<Selection>,

    /// Telemetry of the selected station only
    pub telemetry: Arc<TelemetryFrame>,

    pub link: ConnectionState,

    /// Latest request failed on network
    pub gateway_unreachable: bool,

    pub user: Option<Arc<CurrentUser>>,
}

impl Snapshot {
    pub fn selected_serial(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.serial.as_str())
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.selected_serial()
            .and_then(|serial| self.devices.get(serial))
    }

    pub fn surface(&self) -> Option<Surface> {
        self.selection.as_ref().and_then(|s| s.surface)
    }

    /// Applies a new [Event]. Returns None when nothing changed.
    pub fn apply(&self, event: Event, now: Epoch) -> Option<Transition> {
        let mut next = self.clone();
        let mut notice = None;

        let changed = match event {
            Event::Loaded(devices) => Arc::make_mut(&mut next.devices).replace_all(devices),
            Event::Live(Update::Status(devices)) => {
                Arc::make_mut(&mut next.devices).merge(devices)
            },
            Event::Live(Update::Deleted(serial)) => {
                let removed = next.remove(&serial);
                if removed {
                    notice = Some(Notice::success("A station was removed from the list"));
                }
                removed
            },
            Event::Removed(serial) => {
                let removed = next.remove(&serial);
                if removed {
                    notice = Some(Notice::success(format!(
                        "Station {} removed from the list",
                        serial
                    )));
                }
                removed
            },
            Event::Live(Update::Nmea { serial, record }) => {
                if next.selected_serial() == Some(serial.as_str()) {
                    Arc::make_mut(&mut next.telemetry).apply(record, now);
                    true
                } else {
                    false
                }
            },
            Event::Link(link) => {
                let changed = next.link != link;
                next.link = link;
                changed
            },
            Event::Reachable(reachable) => {
                let changed = next.gateway_unreachable == reachable;
                next.gateway_unreachable = !reachable;
                changed
            },
            Event::Select(serial) => next.select(serial),
            Event::Choose(surface) => next.choose(surface),
            Event::User(user) => {
                let changed = next.user.as_deref() != Some(&user);
                next.user = Some(Arc::new(user));
                changed
            },
        };

        if !changed {
            return None;
        }

        next.reconcile_surface();
        next.version += 1;

        debug!(
            "state v{}: {} devices, selected={:?}, surface={:?}",
            next.version,
            next.devices.len(),
            next.selected_serial(),
            next.surface(),
        );

        Some(Transition {
            snapshot: next,
            notice,
        })
    }

    fn clear_telemetry(&mut self) {
        if !self.telemetry.is_empty() {
            self.telemetry = Arc::new(TelemetryFrame::default());
        }
    }

    fn remove(&mut self, serial: &str) -> bool {
        if !self.devices.contains(serial) {
            return false;
        }

        Arc::make_mut(&mut self.devices).remove(serial);

        if self.selected_serial() == Some(serial) {
            self.selection = None;
            self.clear_telemetry();
        }

        true
    }

    fn select(&mut self, serial: Option<String>) -> bool {
        match serial {
            Some(serial) => {
                if self.selected_serial() == Some(serial.as_str()) {
                    return false;
                }
                if !self.devices.contains(&serial) {
                    warn!("cannot select unknown station \"{}\"", serial);
                    return false;
                }
                self.selection = Some(Selection::new(serial));
                self.clear_telemetry();
                true
            },
            None => {
                if self.selection.take().is_none() {
                    return false;
                }
                self.clear_telemetry();
                true
            },
        }
    }

    fn choose(&mut self, surface: Surface) -> bool {
        let Some(status) = self.selected_device().map(|d| d.status) else {
            return false;
        };

        if !Surface::offered(status).contains(&surface) {
            warn!("{} is not available while {}", surface, status);
            return false;
        }

        match self.selection.as_mut() {
            Some(selection) if selection.surface != Some(surface) => {
                selection.surface = Some(surface);
                true
            },
            _ => false,
        }
    }

    /// Recomputes the preferred surface when the selection is new
    /// or when the selected station configuration moved.
    fn reconcile_surface(&mut self) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };

        let Some(entry) = self.devices.entry(&selection.serial) else {
            return;
        };

        if selection.derived_from == Some(entry.config_version) {
            return;
        }

        selection.derived_from = Some(entry.config_version);

        if let Some(preferred) = Surface::preferred(&entry.device) {
            selection.surface = Some(preferred);
        }
    }
}

use crate::device::Device;

/// One [Device] and the version of its configuration relevant fields
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub device: Device,

    /// Bumped each time status or configurations change,
    /// never on throughput ticks.
    pub config_version: u64,
}

/// Deduplicated, insertion ordered collection of known devices.
/// Stable ordering keeps the device list from jumping around.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeviceStore {
    entries: Vec<Entry>,
}

impl DeviceStore {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, serial: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.device.serial == serial)
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.position(serial).is_some()
    }

    pub fn entry(&self, serial: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.device.serial == serial)
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.entry(serial).map(|e| &e.device)
    }

    /// Iterates devices, in display order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.entries.iter().map(|e| &e.device)
    }

    /// Upserts by serial, replacing whole records (last write wins).
    /// Returns true if the store content changed.
    pub fn merge<I: IntoIterator<Item = Device>>(&mut self, devices: I) -> bool {
        let mut changed = false;

        for device in devices {
            if device.serial.is_empty() {
                continue;
            }

            match self.position(&device.serial) {
                Some(index) => {
                    let entry = &mut self.entries[index];
                    if entry.device == device {
                        continue;
                    }
                    if entry.device.config_differs(&device) {
                        entry.config_version += 1;
                    }
                    entry.device = device;
                    changed = true;
                },
                None => {
                    self.entries.push(Entry {
                        device,
                        config_version: 0,
                    });
                    changed = true;
                },
            }
        }

        changed
    }

    /// Bulk load. The store never shrinks from a bulk load:
    /// [Self::remove] is the only deletion path.
    pub fn replace_all(&mut self, devices: Vec<Device>) -> bool {
        self.merge(devices)
    }

    /// Removes `serial` if present. Returns true if a removal occurred.
    pub fn remove(&mut self, serial: &str) -> bool {
        match self.position(serial) {
            Some(index) => {
                self.entries.remove(index);
                true
            },
            None => false,
        }
    }
}

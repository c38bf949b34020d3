use log::warn;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{device::Device, state::NmeaRecord};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type \"{0}\"")]
    UnknownType(String),

    /// Known message type, not consumed by this console
    #[error("{0} message not consumed")]
    Ignored(String),

    #[error("{0} message without serial")]
    MissingSerial(&'static str),

    #[error("{0} message without data")]
    MissingData(&'static str),

    #[error("invalid {kind} data: {source}")]
    Data {
        kind: &'static str,
        source: serde_json::Error,
    },

    #[error("{0} data is neither a record nor a list of records")]
    Shape(&'static str),
}

/// Decoded live message
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// One or more [Device] records to merge
    Status(Vec<Device>),

    /// Station removed from the list
    Deleted(String),

    /// Telemetry record of one station
    Nmea { serial: String, record: NmeaRecord },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    data: Option<Value>,

    #[serde(default)]
    serial: Option<String>,
}

/// Broadcast by the server, but not consumed here
const IGNORED_TYPES: [&str; 2] = ["base_config_state", "service_config_state"];

/// Decodes every record of a status update on its own:
/// one bad record never rejects the others.
fn status_records(data: Value) -> Result<Vec<Device>, DecodeError> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(_) => vec![data],
        _ => return Err(DecodeError::Shape("status_update")),
    };

    let mut devices = Vec::with_capacity(items.len());

    for item in items {
        match serde_json::from_value::<Device>(item) {
            Ok(device) if device.serial.is_empty() => {
                warn!("status_update: skipped record without serial");
            },
            Ok(device) => devices.push(device),
            Err(e) => {
                warn!("status_update: skipped invalid record: {}", e);
            },
        }
    }

    Ok(devices)
}

impl Update {
    /// Decodes one text frame entirely, before anything gets applied.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope = serde_json::from_str::<Envelope>(text)?;

        match envelope.kind.as_str() {
            "status_update" => {
                let data = envelope
                    .data
                    .ok_or(DecodeError::MissingData("status_update"))?;

                Ok(Self::Status(status_records(data)?))
            },
            "device_deleted" => {
                let serial = envelope
                    .serial
                    .filter(|s| !s.is_empty())
                    .ok_or(DecodeError::MissingSerial("device_deleted"))?;

                Ok(Self::Deleted(serial))
            },
            "nmea_update" => {
                let serial = envelope
                    .serial
                    .filter(|s| !s.is_empty())
                    .ok_or(DecodeError::MissingSerial("nmea_update"))?;

                let data = envelope
                    .data
                    .ok_or(DecodeError::MissingData("nmea_update"))?;

                let record = serde_json::from_value::<NmeaRecord>(data).map_err(|source| {
                    DecodeError::Data {
                        kind: "nmea_update",
                        source,
                    }
                })?;

                Ok(Self::Nmea { serial, record })
            },
            other if IGNORED_TYPES.contains(&other) => {
                Err(DecodeError::Ignored(other.to_string()))
            },
            other => Err(DecodeError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{DecodeError, Update};
    use crate::{device::DeviceStatus, state::NmeaRecord};

    #[test]
    fn status_update_forms() {
        let single = Update::decode(
            r#"{"type":"status_update","data":{"serial":"A","status":"online","bps":512}}"#,
        )
        .unwrap();

        match single {
            Update::Status(devices) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].status, DeviceStatus::Online);
                assert_eq!(devices[0].bps, 512);
            },
            other => panic!("decoded {:?}", other),
        }

        let many = Update::decode(
            r#"{"type":"status_update","data":[{"serial":"A"},{"serial":"B","status":"locked"}]}"#,
        )
        .unwrap();

        match many {
            Update::Status(devices) => {
                assert_eq!(devices.len(), 2);
                assert_eq!(devices[1].status, DeviceStatus::Locked);
            },
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn deletion_and_nmea() {
        assert_eq!(
            Update::decode(r#"{"type":"device_deleted","serial":"A"}"#).unwrap(),
            Update::Deleted("A".to_string())
        );

        match Update::decode(
            r#"{"type":"nmea_update","serial":"A","data":{"type":"GSA","active_sats":[3,7],"pdop":1.1}}"#,
        )
        .unwrap()
        {
            Update::Nmea { serial, record } => {
                assert_eq!(serial, "A");
                assert!(matches!(record, NmeaRecord::Gsa(_)));
            },
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn malformed_frames() {
        assert!(matches!(
            Update::decode("not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            Update::decode(r#"{"type":"reboot"}"#),
            Err(DecodeError::UnknownType(_))
        ));
        assert!(matches!(
            Update::decode(r#"{"type":"device_deleted"}"#),
            Err(DecodeError::MissingSerial(_))
        ));
        assert!(matches!(
            Update::decode(r#"{"type":"nmea_update","data":{"type":"GGA"}}"#),
            Err(DecodeError::MissingSerial(_))
        ));
        assert!(matches!(
            Update::decode(r#"{"type":"nmea_update","serial":"A","data":{"type":"RMC"}}"#),
            Err(DecodeError::Data { .. })
        ));
        assert!(matches!(
            Update::decode(r#"{"type":"status_update","data":42}"#),
            Err(DecodeError::Shape(_))
        ));
    }

    #[test]
    fn bad_records_do_not_reject_batch() {
        let update = Update::decode(
            r#"{"type":"status_update","data":[{"serial":"A","status":"offline"},{"name":"ghost"},{"serial":"B","bps":"fast"}]}"#,
        )
        .unwrap();

        match update {
            Update::Status(devices) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].serial, "A");
                assert_eq!(devices[0].status, DeviceStatus::Offline);
            },
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn loosely_typed_service_config() {
        let update = Update::decode(
            r#"{"type":"status_update","data":{"serial":"A","status":"offline","service_config":{"ncomport":"X","port1":"2101","port2":70000}}}"#,
        )
        .unwrap();

        match update {
            Update::Status(devices) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].status, DeviceStatus::Offline);

                let [first, second] = devices[0].service_config.casters();
                assert_eq!(first.port, Some(2101));
                assert_eq!(second.port, None);
            },
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn config_state_frames_are_ignored() {
        for kind in ["base_config_state", "service_config_state"] {
            let frame = format!(r#"{{"type":"{}","serial":"A","data":{{}}}}"#, kind);
            assert!(matches!(
                Update::decode(&frame),
                Err(DecodeError::Ignored(k)) if k == kind
            ));
        }
    }
}

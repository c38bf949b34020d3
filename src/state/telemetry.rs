use std::collections::BTreeMap;

use hifitime::prelude::Epoch;
use serde::{Deserialize, Serialize};

/// Latest position fix (GGA)
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgaRecord {
    #[serde(default)]
    pub timestamp_utc: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Fix quality, for example "RTK_FIXED"
    #[serde(default)]
    pub fix_status: Option<String>,

    /// Number of satellites used in the fix
    #[serde(default)]
    pub satellites: u32,

    #[serde(default)]
    pub hdop: Option<f64>,

    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Active satellites and dilution of precision (GSA)
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsaRecord {
    pub active_sats: Vec<u16>,

    #[serde(default)]
    pub pdop: Option<f64>,

    #[serde(default)]
    pub hdop: Option<f64>,

    #[serde(default)]
    pub vdop: Option<f64>,
}

/// Partial satellite description (GSV). Absent fields
/// do not override what we already know.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteUpdate {
    pub prn: u16,

    #[serde(default)]
    pub elevation: Option<f64>,

    #[serde(default)]
    pub azimuth: Option<f64>,

    #[serde(default)]
    pub snr: Option<f64>,
}

/// Satellites in view (GSV), possibly aggregated over several sentences
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsvRecord {
    pub satellites: Vec<SatelliteUpdate>,
}

/// Parsed NMEA record, as relayed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NmeaRecord {
    #[serde(rename = "GGA")]
    Gga(GgaRecord),

    #[serde(rename = "GSA")]
    Gsa(GsaRecord),

    #[serde(rename = "GSV")]
    Gsv(GsvRecord),
}

/// Everything we know about one satellite
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteRecord {
    pub prn: u16,

    /// Elevation (degrees)
    pub elevation: Option<f64>,

    /// Azimuth (degrees, clockwise from North)
    pub azimuth: Option<f64>,

    /// Carrier to noise ratio (dB-Hz)
    pub snr: Option<f64>,

    /// True when listed as active by the latest GSA
    pub is_tracking: bool,

    /// [Epoch] of latest GSV mention
    pub last_seen: Epoch,
}

impl SatelliteRecord {
    fn new(prn: u16, last_seen: Epoch) -> Self {
        Self {
            prn,
            last_seen,
            snr: None,
            azimuth: None,
            elevation: None,
            is_tracking: false,
        }
    }

    /// Field level merge: present fields overwrite, absent fields are kept
    fn merge(&mut self, update: &SatelliteUpdate, now: Epoch) {
        if update.elevation.is_some() {
            self.elevation = update.elevation;
        }
        if update.azimuth.is_some() {
            self.azimuth = update.azimuth;
        }
        if update.snr.is_some() {
            self.snr = update.snr;
        }
        self.last_seen = now;
    }
}

/// Live telemetry of the selected station
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TelemetryFrame {
    /// Latest [GgaRecord]
    pub gga: Option<GgaRecord>,

    /// Latest [GsaRecord]
    pub gsa: Option<GsaRecord>,

    /// Satellites indexed by PRN
    pub satellites: BTreeMap<u16, SatelliteRecord>,
}

impl TelemetryFrame {
    pub fn is_empty(&self) -> bool {
        self.gga.is_none() && self.gsa.is_none() && self.satellites.is_empty()
    }

    /// Latches a new [NmeaRecord]
    pub fn apply(&mut self, record: NmeaRecord, now: Epoch) {
        match record {
            NmeaRecord::Gga(gga) => {
                self.gga = Some(gga);
            },
            NmeaRecord::Gsa(gsa) => {
                for (prn, sat) in self.satellites.iter_mut() {
                    sat.is_tracking = gsa.active_sats.contains(prn);
                }
                self.gsa = Some(gsa);
            },
            NmeaRecord::Gsv(gsv) => {
                for update in gsv.satellites.iter() {
                    self.satellites
                        .entry(update.prn)
                        .or_insert_with(|| SatelliteRecord::new(update.prn, now))
                        .merge(update, now);
                }
            },
        }
    }
}

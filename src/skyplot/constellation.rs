use gnss::prelude::Constellation;

/// Constellation of a satellite, from its NMEA PRN
pub fn from_prn(prn: u16) -> Option<Constellation> {
    match prn {
        1..=32 => Some(Constellation::GPS),
        65..=96 => Some(Constellation::Glonass),
        193..=200 => Some(Constellation::QZSS),
        201..=235 => Some(Constellation::Galileo),
        301..=336 => Some(Constellation::BeiDou),
        _ => None,
    }
}

/// Display rank: GPS, Glonass, Galileo, BeiDou, QZSS, then unknown
pub fn rank(constellation: Option<Constellation>) -> usize {
    match constellation {
        Some(Constellation::GPS) => 0,
        Some(Constellation::Glonass) => 1,
        Some(Constellation::Galileo) => 2,
        Some(Constellation::BeiDou) => 3,
        Some(Constellation::QZSS) => 4,
        _ => 5,
    }
}

/// Single character marker
pub fn glyph(constellation: Option<Constellation>) -> char {
    match constellation {
        Some(Constellation::GPS) => 'G',
        Some(Constellation::Glonass) => 'R',
        Some(Constellation::Galileo) => 'E',
        Some(Constellation::BeiDou) => 'C',
        Some(Constellation::QZSS) => 'J',
        _ => '?',
    }
}

pub fn name(constellation: Option<Constellation>) -> &'static str {
    match constellation {
        Some(Constellation::GPS) => "GPS",
        Some(Constellation::Glonass) => "GLONASS",
        Some(Constellation::Galileo) => "Galileo",
        Some(Constellation::BeiDou) => "BeiDou",
        Some(Constellation::QZSS) => "QZSS",
        _ => "Unknown",
    }
}

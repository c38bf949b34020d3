use gnss::prelude::Constellation;
use itertools::Itertools;

use super::constellation;
use crate::state::TelemetryFrame;

/// SNR (dB-Hz) drawn as a full bar
pub const FULL_SCALE_SNR: f64 = 55.0;

/// One signal strength bar
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub prn: u16,
    pub snr: f64,

    /// Fill ratio, in percent
    pub fill: f64,

    pub is_tracking: bool,
}

/// Bars of one constellation
#[derive(Debug, Clone, PartialEq)]
pub struct BarGroup {
    pub constellation: Option<Constellation>,
    pub bars: Vec<Bar>,
}

pub fn fill(snr: f64) -> f64 {
    (snr / FULL_SCALE_SNR * 100.0).min(100.0)
}

/// Satellites with a signal, grouped per constellation in display
/// order, strongest first.
pub fn signal_bars(frame: &TelemetryFrame) -> Vec<BarGroup> {
    frame
        .satellites
        .values()
        .filter_map(|sat| match sat.snr {
            Some(snr) if snr > 0.0 => Some((
                constellation::from_prn(sat.prn),
                Bar {
                    prn: sat.prn,
                    snr,
                    fill: fill(snr),
                    is_tracking: sat.is_tracking,
                },
            )),
            _ => None,
        })
        .sorted_by(|(ca, a), (cb, b)| {
            constellation::rank(*ca)
                .cmp(&constellation::rank(*cb))
                .then(b.snr.total_cmp(&a.snr))
        })
        .chunk_by(|(c, _)| constellation::rank(*c))
        .into_iter()
        .filter_map(|(_, chunk)| {
            let chunk = chunk.collect::<Vec<_>>();
            let constellation = chunk.first().and_then(|(c, _)| *c);
            let bars = chunk.into_iter().map(|(_, bar)| bar).collect::<Vec<_>>();
            if bars.is_empty() {
                None
            } else {
                Some(BarGroup {
                    constellation,
                    bars,
                })
            }
        })
        .collect()
}

/// Text rendition: `G05 ########.. 41`
pub fn format_bar(group: &BarGroup, bar: &Bar, width: usize) -> String {
    let filled = ((bar.fill / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!(
        "{}{:03} {}{} {:>2.0}{}",
        constellation::glyph(group.constellation),
        bar.prn,
        "#".repeat(filled),
        ".".repeat(width - filled),
        bar.snr,
        if bar.is_tracking { " *" } else { "" },
    )
}

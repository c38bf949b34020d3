//! Skyplot: polar satellite view, signal bars and position readout
//! of the selected station, redrawn at a fixed rate.
use std::{sync::Arc, time::Duration};

use log::{debug, trace, warn};
use thiserror::Error;

use tokio::{
    sync::watch::{self, Receiver as WatchRx, Sender as WatchTx},
    task::JoinHandle,
};

mod bars;
mod canvas;
mod constellation;

use bars::signal_bars;
use canvas::TextCanvas;

use crate::state::{Snapshot, TelemetryFrame};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("cannot draw on a {width}x{height} canvas")]
    ZeroSize { width: usize, height: usize },

    #[error("{width}x{height} canvas exceeds {max_width}x{max_height}", max_width = MAX_WIDTH, max_height = MAX_HEIGHT)]
    TooLarge { width: usize, height: usize },
}

/// Largest canvas, in cells
pub const MAX_WIDTH: usize = 512;
pub const MAX_HEIGHT: usize = 256;

/// Terminal cells are about twice as tall as they are wide
const CELL_ASPECT: f64 = 2.0;

/// Signal bar width, in cells
const BAR_WIDTH: usize = 20;

/// Polar projection of the visible sky
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Polar {
    pub cx: f64,
    pub cy: f64,

    /// Horizon radius, in rows
    pub radius: f64,
}

impl Polar {
    fn fit(width: usize, height: usize) -> Self {
        let radius = ((height as f64 - 1.0) / 2.0).min((width as f64 - 1.0) / 2.0 / CELL_ASPECT);
        Self {
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
            radius: radius.max(0.0),
        }
    }

    /// Maps azimuth and elevation (degrees) to canvas coordinates.
    /// Zenith is the center, North is up, azimuth grows clockwise.
    pub fn project(&self, azimuth: f64, elevation: f64) -> (f64, f64) {
        let dist = self.radius * (90.0 - elevation) / 90.0;
        let az = azimuth.to_radians();
        (
            self.cx + dist * az.sin() * CELL_ASPECT,
            self.cy - dist * az.cos(),
        )
    }

    /// Point at `ratio` of the horizon radius, along `azimuth`
    fn at(&self, azimuth: f64, ratio: f64) -> (f64, f64) {
        self.project(azimuth, 90.0 * (1.0 - ratio))
    }
}

/// Fix summary shown under the sky
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub fix: String,
    pub satellites: u32,
    pub hdop: String,
    pub pdop: String,
    pub latitude: String,
    pub longitude: String,
}

impl Readout {
    pub fn new(frame: &TelemetryFrame) -> Self {
        let gga = frame.gga.as_ref();
        let gsa = frame.gsa.as_ref();

        let dop = |value: Option<f64>| match value {
            Some(value) => format!("{:.2}", value),
            None => "0.0".to_string(),
        };

        let angle = |value: Option<f64>| match value {
            Some(value) => format!("{:.8}", value),
            None => "0.0".to_string(),
        };

        Self {
            fix: gga
                .and_then(|gga| gga.fix_status.clone())
                .unwrap_or_else(|| "N/A".to_string()),
            satellites: gga.map(|gga| gga.satellites).unwrap_or_default(),
            hdop: dop(gsa.and_then(|gsa| gsa.hdop)),
            pdop: dop(gsa.and_then(|gsa| gsa.pdop)),
            latitude: angle(gga.and_then(|gga| gga.latitude)),
            longitude: angle(gga.and_then(|gga| gga.longitude)),
        }
    }
}

impl std::fmt::Display for Readout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Fix: {}  Satellites: {}", self.fix, self.satellites)?;
        writeln!(f, "HDOP / PDOP: {} / {}", self.hdop, self.pdop)?;
        write!(f, "Lat: {}  Lon: {}", self.latitude, self.longitude)
    }
}

/// One rendered dashboard frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sky: Vec<String>,
    pub bars: Vec<String>,
    pub readout: Readout,
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in self.sky.iter() {
            writeln!(f, "{}", line)?;
        }
        for line in self.bars.iter() {
            writeln!(f, "{}", line)?;
        }
        write!(f, "{}", self.readout)
    }
}

/// Mounted skyplot. The static grid is drawn on mount and
/// on resize only, satellites on each frame.
#[derive(Debug, Clone)]
pub struct Skyplot {
    polar: Polar,
    background: TextCanvas,
    background_draws: usize,
}

impl Skyplot {
    pub fn mount(width: usize, height: usize) -> Result<Self, RenderError> {
        let background = TextCanvas::new(width, height)?;
        let mut skyplot = Self {
            background,
            polar: Polar::fit(width, height),
            background_draws: 0,
        };
        skyplot.draw_background();
        Ok(skyplot)
    }

    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), RenderError> {
        if width == self.background.width() && height == self.background.height() {
            return Ok(());
        }
        self.background = TextCanvas::new(width, height)?;
        self.polar = Polar::fit(width, height);
        self.draw_background();
        Ok(())
    }

    #[cfg(test)]
    pub fn polar(&self) -> Polar {
        self.polar
    }

    /// Number of times the static layer was drawn
    #[cfg(test)]
    pub fn background_draws(&self) -> usize {
        self.background_draws
    }

    fn draw_background(&mut self) {
        let polar = self.polar;
        let canvas = &mut self.background;

        // elevation rings
        for ratio in [0.25, 0.5, 0.75, 1.0] {
            let steps = (polar.radius * ratio * 8.0).max(8.0) as usize;
            for step in 0..steps {
                let (x, y) = polar.at(360.0 * step as f64 / steps as f64, ratio);
                canvas.plot(x, y, '.');
            }
        }

        // azimuth spokes
        for spoke in 0..12 {
            let azimuth = spoke as f64 * 30.0;
            let steps = polar.radius.ceil().max(1.0) as usize;
            for step in 1..steps {
                let (x, y) = polar.at(azimuth, step as f64 / steps as f64);
                canvas.plot(x, y, '.');
            }
        }

        canvas.plot(polar.cx, polar.cy, '+');

        let (x, y) = polar.at(0.0, 1.0);
        canvas.plot(x, y, 'N');

        self.background_draws += 1;
        debug!(
            "skyplot grid drawn ({}x{}, #{})",
            self.background.width(),
            self.background.height(),
            self.background_draws,
        );
    }

    /// Draws `frame` on top of the static grid
    pub fn draw(&self, frame: &TelemetryFrame) -> Frame {
        let mut canvas = self.background.clone();

        for sat in frame.satellites.values() {
            let (Some(azimuth), Some(elevation)) = (sat.azimuth, sat.elevation) else {
                continue;
            };

            if sat.snr == Some(0.0) {
                continue;
            }

            let (x, y) = self.polar.project(azimuth, elevation);
            let glyph = constellation::glyph(constellation::from_prn(sat.prn));

            if sat.is_tracking {
                canvas.plot(x - 1.0, y, '(');
                canvas.plot(x + 1.0, y, ')');
            }

            canvas.plot(x, y, glyph);
            canvas.text(x + 2.0, y, &sat.prn.to_string());
        }

        let bars = signal_bars(frame)
            .iter()
            .flat_map(|group| {
                group
                    .bars
                    .iter()
                    .map(|bar| bars::format_bar(group, bar, BAR_WIDTH))
                    .collect::<Vec<_>>()
            })
            .collect();

        trace!("skyplot frame: {} satellites", frame.satellites.len());

        Frame {
            sky: canvas.lines(),
            bars,
            readout: Readout::new(frame),
        }
    }
}

/// Consumes rendered frames
pub trait FrameSink: Send {
    fn show(&mut self, frame: &Frame);
}

/// Fixed rate redraw task
pub struct RenderLoop;

impl RenderLoop {
    /// Starts drawing the selected station telemetry, `fps` times per second
    pub fn spawn(
        mut skyplot: Skyplot,
        mut snapshots: WatchRx<Arc<Snapshot>>,
        fps: u32,
        mut sink: Box<dyn FrameSink>,
    ) -> RenderHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (size_tx, mut size_rx) = watch::channel(None::<(usize, usize)>);

        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = snapshots.borrow_and_update().clone();
                        let frame = skyplot.draw(&snapshot.telemetry);
                        sink.show(&frame);
                    },
                    changed = size_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let size = *size_rx.borrow_and_update();
                        if let Some((width, height)) = size {
                            if let Err(e) = skyplot.resize(width, height) {
                                warn!("skyplot resize: {}", e);
                            }
                        }
                    },
                    _ = stop_rx.changed() => {
                        break;
                    },
                }
            }

            debug!("skyplot stopped");
        });

        RenderHandle {
            stop: stop_tx,
            size: size_tx,
            handle: Some(handle),
        }
    }
}

/// Running [RenderLoop]. Dropping it aborts the loop.
pub struct RenderHandle {
    stop: WatchTx<bool>,
    size: WatchTx<Option<(usize, usize)>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderHandle {
    pub fn resize(&self, width: usize, height: usize) {
        self.size.send_replace(Some((width, height)));
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for it
    pub async fn stop(mut self) {
        self.stop.send_replace(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod test {
    use super::{
        Frame, FrameSink, MAX_HEIGHT, Polar, Readout, RenderError, RenderLoop, Skyplot,
    };
    use crate::state::{NmeaRecord, Snapshot, TelemetryFrame};
    use hifitime::prelude::Epoch;
    use serde_json::json;
    use std::{
        str::FromStr,
        sync::{Arc, Mutex},
    };
    use tokio::sync::watch;

    fn frame_with(records: Vec<serde_json::Value>) -> TelemetryFrame {
        let t = Epoch::from_str("2024-06-01T00:00:00 UTC").unwrap();
        let mut frame = TelemetryFrame::default();
        for record in records {
            frame.apply(serde_json::from_value::<NmeaRecord>(record).unwrap(), t);
        }
        frame
    }

    #[test]
    fn projection() {
        let polar = Polar {
            cx: 40.0,
            cy: 10.0,
            radius: 10.0,
        };

        // zenith
        assert_eq!(polar.project(123.0, 90.0), (40.0, 10.0));

        // North horizon
        let (x, y) = polar.project(0.0, 0.0);
        assert!((x - 40.0).abs() < 1e-9);
        assert!((y - 0.0).abs() < 1e-9);

        // East, 45° elevation: half radius, stretched horizontally
        let (x, y) = polar.project(90.0, 45.0);
        assert!((x - 50.0).abs() < 1e-9);
        assert!((y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_sized_mount() {
        assert_eq!(
            Skyplot::mount(0, 21).err(),
            Some(RenderError::ZeroSize {
                width: 0,
                height: 21
            })
        );
    }

    #[test]
    fn oversized_mount() {
        assert!(matches!(
            Skyplot::mount(usize::MAX, usize::MAX),
            Err(RenderError::TooLarge { .. })
        ));

        let mut skyplot = Skyplot::mount(41, 21).unwrap();
        assert!(skyplot.resize(41, MAX_HEIGHT + 1).is_err());
    }

    #[test]
    fn empty_sky() {
        let skyplot = Skyplot::mount(41, 21).unwrap();
        let frame = skyplot.draw(&TelemetryFrame::default());

        assert_eq!(frame.sky.len(), 21);
        assert!(frame.bars.is_empty());
        assert_eq!(
            frame.readout,
            Readout {
                fix: "N/A".to_string(),
                satellites: 0,
                hdop: "0.0".to_string(),
                pdop: "0.0".to_string(),
                latitude: "0.0".to_string(),
                longitude: "0.0".to_string(),
            }
        );

        // North marker on top
        assert!(frame.sky[0].contains('N'));
    }

    #[test]
    fn markers_and_readout() {
        let skyplot = Skyplot::mount(41, 21).unwrap();
        let frame = skyplot.draw(&frame_with(vec![
            json!({"type": "GSV", "satellites": [
                {"prn": 5, "elevation": 90, "azimuth": 0, "snr": 40},
                {"prn": 7, "elevation": 30, "azimuth": 180, "snr": 0},
                {"prn": 9, "azimuth": 270, "snr": 33},
            ]}),
            json!({"type": "GSA", "active_sats": [5], "hdop": 0.6789, "pdop": 1.2}),
            json!({"type": "GGA", "latitude": 21.028511, "longitude": 105.804817, "fix_status": "RTK_FIXED", "satellites": 18}),
        ]));

        let polar = skyplot.polar();
        let center = &frame.sky[polar.cy as usize];

        // tracked satellite at zenith, with halo and label
        assert!(center.contains("(G)5"));

        // no elevation, or zero SNR: not drawn
        assert!(!frame.sky.iter().any(|line| line.contains("7") || line.contains("9")));

        // bars only for satellites with a signal
        assert_eq!(frame.bars.len(), 2);
        assert!(frame.bars[0].starts_with("G005"));
        assert!(frame.bars[0].ends_with('*'));

        assert_eq!(frame.readout.fix, "RTK_FIXED");
        assert_eq!(frame.readout.satellites, 18);
        assert_eq!(frame.readout.hdop, "0.68");
        assert_eq!(frame.readout.pdop, "1.20");
        assert_eq!(frame.readout.latitude, "21.02851100");
        assert_eq!(frame.readout.longitude, "105.80481700");
    }

    #[test]
    fn grid_drawn_on_mount_and_resize_only() {
        let mut skyplot = Skyplot::mount(41, 21).unwrap();
        assert_eq!(skyplot.background_draws(), 1);

        for _ in 0..5 {
            skyplot.draw(&TelemetryFrame::default());
        }
        assert_eq!(skyplot.background_draws(), 1);

        skyplot.resize(41, 21).unwrap();
        assert_eq!(skyplot.background_draws(), 1);

        skyplot.resize(61, 31).unwrap();
        assert_eq!(skyplot.background_draws(), 2);

        assert!(skyplot.resize(0, 0).is_err());
    }

    struct Recorder(Arc<Mutex<Vec<Frame>>>);

    impl FrameSink for Recorder {
        fn show(&mut self, frame: &Frame) {
            self.0.lock().unwrap().push(frame.clone());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn render_loop_lifecycle() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let (_tx, rx) = watch::channel(Arc::new(Snapshot::default()));

        let handle = RenderLoop::spawn(
            Skyplot::mount(21, 11).unwrap(),
            rx,
            4,
            Box::new(Recorder(frames.clone())),
        );

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(handle.is_running());

        handle.stop().await;

        let count = frames.lock().unwrap().len();
        assert!(count >= 4, "only {} frames", count);

        tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
        assert_eq!(frames.lock().unwrap().len(), count);
    }
}

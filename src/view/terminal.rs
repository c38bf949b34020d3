use std::{fmt::Write as _, sync::Arc};

use log::{debug, error};

use tokio::sync::{mpsc::UnboundedReceiver, watch::Receiver as WatchRx};

use super::{AdminAction, Content, Details, DeviceList, ViewTree, render};

use crate::{
    notice::Notice,
    skyplot::{Frame, FrameSink, RenderHandle, RenderLoop, Skyplot},
    state::Snapshot,
};

/// Text rendition of a [ViewTree]
pub fn format_view(view: &ViewTree) -> String {
    let mut text = String::new();
    let header = &view.header;

    let _ = write!(
        text,
        "CORS dashboard | {} station(s) | live: {} [{}]",
        header.station_count,
        header.link,
        if header.online { "online" } else { "offline" },
    );

    if let Some(user) = &header.user {
        let _ = write!(text, " | {}", user);
    }
    if header.can_export {
        text.push_str(" | export available");
    }
    if header.can_manage_users {
        text.push_str(" | user management available");
    }
    text.push('\n');

    match &view.devices {
        DeviceList::Empty => text.push_str("  No stations yet.\n"),
        DeviceList::Items(items) => {
            for item in items.iter() {
                let _ = writeln!(
                    text,
                    "{} {:<20} {:<16} {:<14} {:>10} {} {}{}",
                    if item.selected { ">" } else { " " },
                    item.name,
                    item.status,
                    item.serial,
                    item.throughput,
                    if item.ntrip_connected { "NTRIP" } else { "-----" },
                    item.chip,
                    if item.locked { " LOCKED" } else { "" },
                );
            }
        },
    }

    text.push_str("--\n");

    match &view.details {
        Details::Placeholder => text.push_str("Select a station from the list.\n"),
        Details::ResetInProgress { name, serial } => {
            let _ = writeln!(
                text,
                "Resetting {} ({}): wiping configuration and rebooting.\nThe station returns to license issuance shortly.",
                name, serial
            );
        },
        Details::Station(panel) => {
            let _ = writeln!(
                text,
                "{} [{}]{}  serial {}  chip {}",
                panel.name,
                panel.status,
                if panel.locked { " [LOCKED]" } else { "" },
                panel.serial,
                panel.chip,
            );

            let tabs = panel
                .tabs
                .iter()
                .map(|tab| {
                    if tab.active {
                        format!("[{}]", tab.surface)
                    } else {
                        tab.surface.to_string()
                    }
                })
                .collect::<Vec<_>>();

            if !tabs.is_empty() {
                let _ = writeln!(text, "Tabs: {}", tabs.join(" "));
            }

            match &panel.content {
                Content::None | Content::Dashboard => {},
                Content::License { serial } => {
                    let _ = writeln!(
                        text,
                        "License: run `license {}` to generate and deploy a key",
                        serial
                    );
                },
                Content::Provisioning { name } => {
                    let _ = writeln!(text, "Provisioning: station name \"{}\"", name);
                },
                Content::BaseConfig(form) => {
                    let coordinate = |value: Option<f64>| {
                        value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
                    };
                    let _ = writeln!(
                        text,
                        "GNSS: method {}  lat {}  lon {}  alt {}  accuracy {} mm  survey-in {} s",
                        form.method,
                        coordinate(form.latitude),
                        coordinate(form.longitude),
                        coordinate(form.altitude),
                        form.accuracy_mm,
                        form.survey_in_duration,
                    );
                },
                Content::ServiceConfig(form) => {
                    let _ = writeln!(
                        text,
                        "Services: station id \"{}\"  reconnection {} s",
                        form.ncomport, form.reconnection_interval,
                    );
                    for (index, caster) in form.casters.iter().enumerate() {
                        let _ = writeln!(
                            text,
                            "  caster {}: {} {}:{} /{}",
                            index + 1,
                            if caster.enabled { "enabled" } else { "disabled" },
                            caster.host.as_deref().unwrap_or("-"),
                            caster.port.map(|p| p.to_string()).unwrap_or_default(),
                            caster.mountpoint.as_deref().unwrap_or(""),
                        );
                    }
                    let rtcm = &form.rtcm_input;
                    let _ = writeln!(
                        text,
                        "  rtcm input: {} {}:{} /{}",
                        if rtcm.enabled { "enabled" } else { "disabled" },
                        rtcm.host.as_deref().unwrap_or("-"),
                        rtcm.port.map(|p| p.to_string()).unwrap_or_default(),
                        rtcm.mountpoint.as_deref().unwrap_or(""),
                    );
                },
            }

            let _ = writeln!(
                text,
                "Actions: reset | {} | delete",
                match panel.admin_action {
                    AdminAction::Lock => "lock",
                    AdminAction::Unlock => "unlock",
                }
            );
        },
    }

    text
}

/// Prints frames that differ from the previous one
#[derive(Default)]
pub struct StdoutSink {
    last: String,
}

impl FrameSink for StdoutSink {
    fn show(&mut self, frame: &Frame) {
        let text = frame.to_string();
        if text != self.last {
            println!("{}", text);
            self.last = text;
        }
    }
}

/// Imperative side of the view: prints each new [ViewTree]
/// and mounts the skyplot while the dashboard is shown.
pub struct Presenter {
    snapshots: WatchRx<Arc<Snapshot>>,
    notices: UnboundedReceiver<Notice>,
    shutdown: WatchRx<bool>,

    /// Skyplot size, in cells
    layout: WatchRx<(usize, usize)>,

    fps: u32,
    last: Option<ViewTree>,
    render: Option<RenderHandle>,
}

impl Presenter {
    /// Builds new [Presenter]
    pub fn new(
        snapshots: WatchRx<Arc<Snapshot>>,
        notices: UnboundedReceiver<Notice>,
        layout: WatchRx<(usize, usize)>,
        shutdown: WatchRx<bool>,
        fps: u32,
    ) -> Self {
        Self {
            snapshots,
            notices,
            layout,
            shutdown,
            fps,
            last: None,
            render: None,
        }
    }

    async fn present(&mut self) {
        let snapshot = self.snapshots.borrow_and_update().clone();
        let view = render(&snapshot);

        let dashboard = matches!(
            &view.details,
            Details::Station(panel) if panel.content == Content::Dashboard
        );

        if self.last.as_ref() != Some(&view) {
            println!("{}", format_view(&view));
            self.last = Some(view);
        }

        let running = self.render.as_ref().is_some_and(RenderHandle::is_running);

        match (dashboard, running) {
            (true, false) => {
                let (width, height) = *self.layout.borrow();
                match Skyplot::mount(width, height) {
                    Ok(skyplot) => {
                        debug!("mounting skyplot");
                        self.render = Some(RenderLoop::spawn(
                            skyplot,
                            self.snapshots.clone(),
                            self.fps,
                            Box::new(StdoutSink::default()),
                        ));
                    },
                    Err(e) => error!("skyplot: {}", e),
                }
            },
            (false, _) => {
                if let Some(render) = self.render.take() {
                    debug!("unmounting skyplot");
                    render.stop().await;
                }
            },
            _ => {},
        }
    }

    fn resize(&mut self) {
        let (width, height) = *self.layout.borrow_and_update();
        if let Some(render) = &self.render {
            debug!("skyplot resized to {}x{}", width, height);
            render.resize(width, height);
        }
    }

    pub async fn run(&mut self) {
        self.present().await;

        let mut resizable = true;

        loop {
            tokio::select! {
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.present().await;
                },
                changed = self.layout.changed(), if resizable => {
                    match changed {
                        Ok(_) => self.resize(),
                        Err(_) => resizable = false,
                    }
                },
                notice = self.notices.recv() => match notice {
                    Some(notice) => println!("{}", notice),
                    None => break,
                },
                _ = self.shutdown.changed() => {
                    break;
                },
            }
        }

        if let Some(render) = self.render.take() {
            render.stop().await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Presenter, format_view};
    use crate::{
        device::{Device, DeviceStatus},
        notice::Notices,
        state::{Event, Snapshot},
        view::render,
    };
    use hifitime::prelude::Epoch;
    use std::{str::FromStr, sync::Arc};
    use tokio::sync::watch;

    fn snapshot(events: Vec<Event>) -> Snapshot {
        let t = Epoch::from_str("2024-06-01T00:00:00 UTC").unwrap();
        events.into_iter().fold(Snapshot::default(), |s, event| {
            s.apply(event, t).map(|t| t.snapshot).unwrap_or(s)
        })
    }

    #[test]
    fn empty_list_placeholder() {
        let text = format_view(&render(&Snapshot::default()));
        assert!(text.contains("0 station(s)"));
        assert!(text.contains("No stations yet."));
        assert!(text.contains("Select a station from the list."));
    }

    #[test]
    fn selected_station_text() {
        let s = snapshot(vec![
            Event::Loaded(vec![Device {
                serial: "PI-1".to_string(),
                name: "Hanoi".to_string(),
                status: DeviceStatus::AwaitingLicense,
                ..Default::default()
            }]),
            Event::Select(Some("PI-1".to_string())),
        ]);

        let text = format_view(&render(&s));
        assert!(text.contains("> Hanoi"));
        assert!(text.contains("Tabs: [License]"));
        assert!(text.contains("license PI-1"));
        assert!(text.contains("Actions: reset | lock"));
    }

    #[tokio::test(start_paused = true)]
    async fn skyplot_follows_dashboard() {
        let online = Device {
            serial: "PI-1".to_string(),
            status: DeviceStatus::Online,
            base_config: serde_json::from_value(serde_json::json!({"base_setup_method": "SURVEY_IN"}))
                .unwrap(),
            service_config: serde_json::from_value(serde_json::json!({"ncomport": "ID"})).unwrap(),
            ..Default::default()
        };

        let dashboard = snapshot(vec![
            Event::Loaded(vec![online]),
            Event::Select(Some("PI-1".to_string())),
        ]);

        let (tx, rx) = watch::channel(Arc::new(dashboard.clone()));
        let (_notices, notices_rx) = Notices::new();
        let (_layout_tx, layout_rx) = watch::channel((21, 11));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut presenter = Presenter::new(rx, notices_rx, layout_rx, shutdown_rx, 4);

        presenter.present().await;
        assert!(presenter.render.is_some());

        let cleared = snapshot(vec![]);
        tx.send_replace(Arc::new(cleared));
        presenter.present().await;
        assert!(presenter.render.is_none());
    }
}

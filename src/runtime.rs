use std::{str::FromStr, sync::Arc};

use log::{debug, error, info, warn};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::{
        mpsc::{Receiver, Sender},
        watch::{self, Receiver as WatchRx, Sender as WatchTx},
    },
};

use crate::{
    clock::Clock,
    gateway::{Commands, GatewayError},
    notice::Notices,
    settings::CanvasSize,
    state::{Event, Snapshot, Surface},
};

/// Single writer of the console state. Applies [Event]s one at a time
/// and publishes every resulting [Snapshot].
pub struct Runtime {
    snapshot: Arc<Snapshot>,
    clock: Arc<dyn Clock>,
    events: Receiver<Event>,
    publisher: WatchTx<Arc<Snapshot>>,
    notices: Notices,
    shutdown: WatchRx<bool>,
}

impl Runtime {
    /// Builds new [Runtime], and the watch end readers subscribe to.
    pub fn new(
        clock: Arc<dyn Clock>,
        events: Receiver<Event>,
        notices: Notices,
        shutdown: WatchRx<bool>,
    ) -> (Self, WatchRx<Arc<Snapshot>>) {
        let snapshot = Arc::new(Snapshot::default());
        let (publisher, snapshots) = watch::channel(snapshot.clone());
        (
            Self {
                snapshot,
                clock,
                events,
                publisher,
                notices,
                shutdown,
            },
            snapshots,
        )
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.clone()
    }

    /// Applies a single [Event]. Returns true when state changed.
    pub fn handle(&mut self, event: Event) -> bool {
        let Some(transition) = self.snapshot.apply(event, self.clock.now()) else {
            return false;
        };

        self.snapshot = Arc::new(transition.snapshot);
        self.publisher.send_replace(self.snapshot.clone());

        if let Some(notice) = transition.notice {
            self.notices.publish(notice);
        }
        true
    }

    pub async fn run(&mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.handle(event);
                    },
                    None => {
                        debug!("all event producers are gone");
                        break;
                    },
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
            }
        }
        info!("controller stopped at version {}", self.snapshot.version);
    }
}

/// Command on the selected station
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Reset,
    Lock,
    Unlock,
    /// Remove from the list
    Delete,
    Provision(String),
    /// Deploy this key, or a freshly generated one
    License(Option<String>),
}

impl Action {
    /// Outcome is reported through notices. A confirmed
    /// deletion comes back to the controller as [Event::Removed].
    pub async fn perform(&self, commands: &Commands, serial: &str) -> Result<(), GatewayError> {
        match self {
            Self::Reset => commands.reset(serial).await,
            Self::Lock => commands.lock(serial).await,
            Self::Unlock => commands.unlock(serial).await,
            Self::Delete => commands.delete(serial).await,
            Self::Provision(name) => commands.provision(serial, name).await,
            Self::License(key) => commands.license(serial, key.as_deref()).await,
        }
    }
}

/// Operator input of the interactive console
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Select(String),
    Clear,
    Tab(Surface),
    Resize(CanvasSize),
    Act(Action),
    Quit,
}

impl FromStr for Input {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();

        let (verb, argument) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, Some(rest.trim())),
            None => (line, None),
        };

        match (verb, argument) {
            ("select", Some(serial)) => Ok(Self::Select(serial.to_string())),
            ("clear", None) => Ok(Self::Clear),
            ("tab", Some(surface)) => Ok(Self::Tab(Surface::from_str(surface)?)),
            ("size", Some(size)) => Ok(Self::Resize(
                CanvasSize::from_str(size).map_err(|e| e.to_string())?,
            )),
            ("reset", None) => Ok(Self::Act(Action::Reset)),
            ("lock", None) => Ok(Self::Act(Action::Lock)),
            ("unlock", None) => Ok(Self::Act(Action::Unlock)),
            ("delete", None) => Ok(Self::Act(Action::Delete)),
            ("provision", Some(name)) => Ok(Self::Act(Action::Provision(name.to_string()))),
            ("license", key) => Ok(Self::Act(Action::License(key.map(String::from)))),
            ("quit" | "exit", None) => Ok(Self::Quit),
            _ => Err(format!(
                "unknown input \"{}\": select <serial> | clear | tab <surface> | size <WxH> \
                 | reset | lock | unlock | delete | provision <name> | license [key] | quit",
                line
            )),
        }
    }
}

/// Reads operator [Input]s line by line. `quit` ends the session.
/// Station commands apply to the selected station and run in the background.
pub struct Prompt<R> {
    reader: BufReader<R>,
    events: Sender<Event>,

    /// Latest state, to resolve the selected station
    snapshots: WatchRx<Arc<Snapshot>>,

    commands: Commands,

    /// Skyplot size requests
    layout: WatchTx<(usize, usize)>,

    shutdown: WatchTx<bool>,
}

impl<R: AsyncRead + Unpin> Prompt<R> {
    /// Builds new [Prompt]
    pub fn new(
        input: R,
        events: Sender<Event>,
        snapshots: WatchRx<Arc<Snapshot>>,
        commands: Commands,
        layout: WatchTx<(usize, usize)>,
        shutdown: WatchTx<bool>,
    ) -> Self {
        Self {
            events,
            snapshots,
            commands,
            layout,
            shutdown,
            reader: BufReader::new(input),
        }
    }

    fn act(snapshots: &WatchRx<Arc<Snapshot>>, commands: &Commands, action: Action) {
        let serial = snapshots.borrow().selected_serial().map(str::to_string);

        let Some(serial) = serial else {
            warn!("select a station first");
            return;
        };

        let commands = commands.clone();

        tokio::spawn(async move {
            if let Err(e) = action.perform(&commands, &serial).await {
                debug!("{}: {:?} failed: {}", serial, action, e);
            }
        });
    }

    pub async fn run(self) {
        let mut lines = self.reader.lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("end of operator input");
                    return;
                },
                Err(e) => {
                    error!("stdin: {}", e);
                    return;
                },
            };

            if line.trim().is_empty() {
                continue;
            }

            let event = match line.parse::<Input>() {
                Ok(Input::Quit) => break,
                Ok(Input::Select(serial)) => Event::Select(Some(serial)),
                Ok(Input::Clear) => Event::Select(None),
                Ok(Input::Tab(surface)) => Event::Choose(surface),
                Ok(Input::Resize(CanvasSize(width, height))) => {
                    self.layout.send_replace((width, height));
                    continue;
                },
                Ok(Input::Act(action)) => {
                    Self::act(&self.snapshots, &self.commands, action);
                    continue;
                },
                Err(e) => {
                    warn!("{}", e);
                    continue;
                },
            };

            if self.events.send(event).await.is_err() {
                return;
            }
        }

        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod test {
    use super::{Action, Input, Prompt, Runtime};
    use crate::{
        clock::{Clock, test::ManualClock},
        device::{Device, DeviceStatus},
        gateway::{
            Commands,
            test::{Fixture, reply},
        },
        notice::{Level, Notices},
        settings::CanvasSize,
        state::{Event, Snapshot, Surface},
    };
    use serde_json::Value;
    use std::{str::FromStr, sync::Arc};
    use tokio::sync::{mpsc, watch};

    fn commands(fixture: &Fixture, notices: Notices, events: mpsc::Sender<Event>) -> Commands {
        Commands::new(Arc::new(fixture.gateway()), notices).with_events(events)
    }

    fn device(serial: &str) -> Device {
        Device {
            serial: serial.to_string(),
            status: DeviceStatus::Online,
            ..Default::default()
        }
    }

    #[test]
    fn operator_input() {
        assert_eq!(Input::from_str("select PI-1"), Ok(Input::Select("PI-1".to_string())));
        assert_eq!(Input::from_str("  clear "), Ok(Input::Clear));
        assert_eq!(Input::from_str("tab gnss"), Ok(Input::Tab(Surface::BaseConfig)));
        assert_eq!(Input::from_str("size 61x31"), Ok(Input::Resize(CanvasSize(61, 31))));
        assert_eq!(Input::from_str("quit"), Ok(Input::Quit));
        assert!(Input::from_str("size 0x0").is_err());
        assert!(Input::from_str("select").is_err());
        assert!(Input::from_str("tab nowhere").is_err());
        assert!(Input::from_str("reboot PI-1").is_err());

        assert_eq!(Input::from_str("delete"), Ok(Input::Act(Action::Delete)));
        assert_eq!(Input::from_str("unlock "), Ok(Input::Act(Action::Unlock)));
        assert_eq!(
            Input::from_str("provision Hanoi base"),
            Ok(Input::Act(Action::Provision("Hanoi base".to_string())))
        );
        assert_eq!(Input::from_str("license"), Ok(Input::Act(Action::License(None))));
        assert_eq!(
            Input::from_str("license ABC-123"),
            Ok(Input::Act(Action::License(Some("ABC-123".to_string()))))
        );
        assert!(Input::from_str("provision").is_err());
        assert!(Input::from_str("reset PI-1").is_err());
    }

    #[tokio::test]
    async fn events_are_published_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let (notices, mut notices_rx) = Notices::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (mut runtime, snapshots) =
            Runtime::new(Arc::new(ManualClock::new()), rx, notices, shutdown_rx);

        tx.send(Event::Loaded(vec![device("A"), device("B")])).await.unwrap();
        tx.send(Event::Select(Some("A".to_string()))).await.unwrap();
        tx.send(Event::Removed("A".to_string())).await.unwrap();
        drop(tx);

        runtime.run().await;

        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.devices.len(), 1);
        assert_eq!(snapshot.selected_serial(), None);
        assert!(Arc::ptr_eq(&snapshot, &runtime.snapshot()));

        let notice = notices_rx.try_recv().unwrap();
        assert_eq!(notice.level, Level::Success);

        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn noop_events_are_not_published() {
        let (_tx, rx) = mpsc::channel(8);
        let (notices, _notices_rx) = Notices::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (mut runtime, mut snapshots) =
            Runtime::new(Arc::new(ManualClock::new()), rx, notices, shutdown_rx);

        assert!(!runtime.handle(Event::Removed("ghost".to_string())));
        assert!(!snapshots.has_changed().unwrap());

        assert!(runtime.handle(Event::Loaded(vec![device("A")])));
        assert!(snapshots.has_changed().unwrap());
        snapshots.borrow_and_update();
    }

    #[tokio::test]
    async fn shutdown_stops_controller() {
        let (_tx, rx) = mpsc::channel(8);
        let (notices, _notices_rx) = Notices::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (mut runtime, _) = Runtime::new(Arc::new(ManualClock::new()), rx, notices, shutdown_rx);

        let task = tokio::spawn(async move { runtime.run().await });
        shutdown_tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn prompt_forwards_input() {
        let input: &[u8] =
            b"select PI-1\nbogus\n\ntab services\nsize 61x31\nclear\nquit\nselect PI-2\n";

        let (tx, mut rx) = mpsc::channel(8);
        let (notices, _notices_rx) = Notices::new();
        let (_snapshots_tx, snapshots) = watch::channel(Arc::new(Snapshot::default()));
        let (layout_tx, layout_rx) = watch::channel((41, 21));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let fixture = Fixture::new(Vec::new());
        let commands = commands(&fixture, notices, tx.clone());

        Prompt::new(input, tx, snapshots, commands, layout_tx, shutdown_tx)
            .run()
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Event::Select(Some(serial)) if serial == "PI-1"));
        assert!(matches!(events[1], Event::Choose(Surface::ServiceConfig)));
        assert!(matches!(events[2], Event::Select(None)));
        assert_eq!(*layout_rx.borrow(), (61, 31));
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn delete_from_console() {
        let clock = ManualClock::new();

        let snapshot = Snapshot::default()
            .apply(Event::Loaded(vec![device("A"), device("B")]), clock.now())
            .unwrap()
            .snapshot
            .apply(Event::Select(Some("A".to_string())), clock.now())
            .unwrap()
            .snapshot;

        let (tx, mut rx) = mpsc::channel(8);
        let (notices, _notices_rx) = Notices::new();
        let (_snapshots_tx, snapshots) = watch::channel(Arc::new(snapshot.clone()));
        let (layout_tx, _layout_rx) = watch::channel((41, 21));
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        let fixture = Fixture::new(vec![reply(200, Value::Null)]);
        let commands = commands(&fixture, notices, tx.clone());

        let input: &[u8] = b"delete\nquit\n";
        Prompt::new(input, tx, snapshots, commands, layout_tx, shutdown_tx)
            .run()
            .await;

        // confirmed locally once the request succeeded
        let event = rx.recv().await.unwrap();
        assert!(matches!(&event, Event::Removed(serial) if serial == "A"));

        {
            let requests = fixture.backend.requests.lock().unwrap();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].0, "DELETE");
            assert_eq!(requests[0].1, "/api/devices/A");
        }

        let transition = snapshot.apply(event, clock.now()).unwrap();
        assert_eq!(transition.snapshot.devices.len(), 1);
        assert_eq!(transition.snapshot.selected_serial(), None);
        assert!(transition.notice.is_some());
    }

    #[tokio::test]
    async fn station_commands_need_a_selection() {
        let (tx, mut rx) = mpsc::channel(8);
        let (notices, _notices_rx) = Notices::new();
        let (_snapshots_tx, snapshots) = watch::channel(Arc::new(Snapshot::default()));
        let (layout_tx, _layout_rx) = watch::channel((41, 21));
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        let fixture = Fixture::new(Vec::new());
        let commands = commands(&fixture, notices, tx.clone());

        let input: &[u8] = b"lock\ndelete\n";
        Prompt::new(input, tx, snapshots, commands, layout_tx, shutdown_tx)
            .run()
            .await;

        tokio::task::yield_now().await;
        assert_eq!(fixture.backend.calls(), 0);
        assert!(rx.try_recv().is_err());
    }
}

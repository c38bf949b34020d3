//! Live updates channel: one long lived task that keeps a connection
//! to the server and forwards decoded messages to the controller.
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;

use tokio::sync::{mpsc::Sender, watch::Receiver as WatchRx};

mod envelope;
mod reconnect;
mod ws;

pub use envelope::Update;
use envelope::DecodeError;
pub use reconnect::{BackoffPolicy, ConnectionState, Next, Reconnect};
pub use ws::WsTransport;

use crate::{clock::Clock, notice::Notices, state::Event};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid base url \"{0}\": expecting http:// or https://")]
    Url(String),

    #[error("websocket error: {0}")]
    Socket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("gave up after {0} reconnection attempts")]
    Exhausted(u32),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(Box::new(e))
    }
}

/// Opens connections
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Describes the remote end, for logging purposes
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError>;
}

/// One established connection
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Next text frame. None once closed by the remote end.
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>>;
}

pub struct LiveChannel {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    reconnect: Reconnect,
    policy: BackoffPolicy,
    events: Sender<Event>,
    notices: Notices,
    shutdown: WatchRx<bool>,
}

/// How one connection ended
enum Ending {
    Closed,
    Shutdown,
}

impl LiveChannel {
    /// Builds new [LiveChannel]
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        policy: BackoffPolicy,
        events: Sender<Event>,
        notices: Notices,
        shutdown: WatchRx<bool>,
    ) -> Self {
        Self {
            transport,
            clock,
            policy,
            events,
            notices,
            shutdown,
            reconnect: Reconnect::new(policy),
        }
    }

    /// Publishes a new [ConnectionState]. Returns false once
    /// the controller is gone.
    async fn publish(&self, state: ConnectionState) -> bool {
        self.events.send(Event::Link(state)).await.is_ok()
    }

    async fn dispatch(&self, text: &str) -> bool {
        match Update::decode(text) {
            Ok(update) => self.events.send(Event::Live(update)).await.is_ok(),
            Err(e @ DecodeError::Ignored(_)) => {
                debug!("{}", e);
                true
            },
            Err(e) => {
                error!("dropped live message: {} - {}", e, text);
                true
            },
        }
    }

    /// Consumes one connection until it closes
    async fn serve(&mut self, mut connection: Box<dyn Connection>) -> Ending {
        loop {
            tokio::select! {
                frame = connection.next_text() => match frame {
                    Some(Ok(text)) => {
                        if !self.dispatch(&text).await {
                            return Ending::Shutdown;
                        }
                    },
                    Some(Err(e)) => {
                        warn!("live updates read error: {}", e);
                        return Ending::Closed;
                    },
                    None => {
                        info!("live updates closed by server");
                        return Ending::Closed;
                    },
                },
                _ = self.shutdown.changed() => {
                    return Ending::Shutdown;
                },
            }
        }
    }

    /// Runs until shutdown, or until the reconnection budget is exhausted.
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            let state = self.reconnect.connecting();
            if !self.publish(state).await {
                return Ok(());
            }

            debug!("connecting to {}", self.transport.endpoint());

            let transport = self.transport.clone();

            let connected = tokio::select! {
                connected = transport.connect() => connected,
                _ = self.shutdown.changed() => {
                    return Ok(());
                },
            };

            match connected {
                Ok(connection) => {
                    info!("live updates connected ({})", self.transport.endpoint());

                    let state = self.reconnect.opened();
                    if !self.publish(state).await {
                        return Ok(());
                    }

                    if let Ending::Shutdown = self.serve(connection).await {
                        return Ok(());
                    }
                },
                Err(e) => {
                    warn!("live updates connection failed: {}", e);
                },
            }

            match self.reconnect.closed() {
                Next::Retry(delay) => {
                    if !self.publish(self.reconnect.state()).await {
                        return Ok(());
                    }

                    if let ConnectionState::ClosedRetrying { attempt, .. } = self.reconnect.state()
                    {
                        warn!(
                            "reconnecting in {:.1}s (attempt {}/{})",
                            delay.as_secs_f64(),
                            attempt,
                            self.policy.max_attempts
                        );
                    }

                    let clock = self.clock.clone();

                    tokio::select! {
                        _ = clock.sleep(delay) => {},
                        _ = self.shutdown.changed() => {
                            return Ok(());
                        },
                    }
                },
                Next::Exhausted => {
                    let _ = self.publish(ConnectionState::ClosedExhausted).await;

                    let e = ChannelError::Exhausted(self.policy.max_attempts);
                    error!("live updates: {}", e);

                    self.notices.error(
                        "Lost connection to live updates. Restart the console to reconnect.",
                    );

                    return Err(e);
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{
        BackoffPolicy, ChannelError, Connection, ConnectionState, LiveChannel, Transport, Update,
    };
    use crate::{clock::test::ManualClock, notice::Notices, state::Event};
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };
    use tokio::sync::{mpsc, watch};

    enum Script {
        Refuse,
        Frames(Vec<String>),
        Hang,
    }

    struct ScriptedTransport {
        script: Mutex<VecDeque<Script>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    struct ScriptedConnection {
        frames: VecDeque<String>,
        hang: bool,
    }

    #[async_trait::async_trait]
    impl Connection for ScriptedConnection {
        async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.frames.pop_front().map(Ok)
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        fn endpoint(&self) -> &str {
            "ws://scripted/ws/updates"
        }

        async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Script::Frames(frames)) => Ok(Box::new(ScriptedConnection {
                    frames: frames.into(),
                    hang: false,
                })),
                Some(Script::Hang) => Ok(Box::new(ScriptedConnection {
                    frames: VecDeque::new(),
                    hang: true,
                })),
                Some(Script::Refuse) | None => Err(ChannelError::Refused("scripted".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn reconnects_then_gives_up() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Script::Refuse,
            Script::Frames(vec![
                r#"{"type":"status_update","data":{"serial":"A","status":"online"}}"#.to_string(),
                "{broken".to_string(),
                r#"{"type":"base_config_state","serial":"A","data":{}}"#.to_string(),
                r#"{"type":"device_deleted","serial":"A"}"#.to_string(),
            ]),
        ]));

        let clock = Arc::new(ManualClock::new());
        let (tx, mut rx) = mpsc::channel(64);
        let (notices, mut notices_rx) = Notices::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let policy = BackoffPolicy {
            max_attempts: 2,
            ..Default::default()
        };

        let mut channel = LiveChannel::new(
            transport,
            clock.clone(),
            policy,
            tx,
            notices,
            shutdown_rx,
        );

        let result = channel.run().await;
        assert!(matches!(result, Err(ChannelError::Exhausted(2))));

        assert_eq!(
            clock.sleeps(),
            [
                Duration::from_millis(1000),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );

        let mut links = Vec::new();
        let mut updates = Vec::new();

        while let Ok(event) = rx.try_recv() {
            match event {
                Event::Link(state) => links.push(state),
                Event::Live(update) => updates.push(update),
                other => panic!("unexpected event {:?}", other),
            }
        }

        // malformed and unconsumed frames dropped, the rest in order
        assert_eq!(updates.len(), 2);
        assert!(matches!(updates[0], Update::Status(_)));
        assert_eq!(updates[1], Update::Deleted("A".to_string()));

        assert!(links.contains(&ConnectionState::Open));
        assert_eq!(links.last(), Some(&ConnectionState::ClosedExhausted));

        let notice = notices_rx.try_recv().unwrap();
        assert!(notice.message.contains("Restart the console"));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let transport = Arc::new(ScriptedTransport::new(vec![Script::Hang]));
        let (tx, mut rx) = mpsc::channel(64);
        let (notices, _notices_rx) = Notices::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut channel = LiveChannel::new(
            transport,
            Arc::new(ManualClock::new()),
            BackoffPolicy::default(),
            tx,
            notices,
            shutdown_rx,
        );

        let handle = tokio::spawn(async move { channel.run().await });

        assert_eq!(
            rx.recv().await.map(|e| matches!(e, Event::Link(ConnectionState::Connecting))),
            Some(true)
        );
        assert_eq!(
            rx.recv().await.map(|e| matches!(e, Event::Link(ConnectionState::Open))),
            Some(true)
        );

        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}

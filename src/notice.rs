use log::{error, info, trace};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::gateway::GatewayError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

/// User visible message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: user_message(message.into()),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.level {
            Level::Success => write!(f, "[ok] {}", self.message),
            Level::Error => write!(f, "[error] {}", self.message),
        }
    }
}

/// Low level network failures are not meaningful to operators
fn user_message(message: String) -> String {
    let lowercase = message.to_lowercase();
    if lowercase.contains("network") || lowercase.contains("fetch") {
        "Network connection error. Please check your connectivity.".to_string()
    } else {
        message
    }
}

/// Single notice surface: every user visible message goes through here.
#[derive(Debug, Clone)]
pub struct Notices {
    tx: UnboundedSender<Notice>,
}

impl Notices {
    pub fn new() -> (Self, UnboundedReceiver<Notice>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, notice: Notice) {
        match notice.level {
            Level::Success => info!("{}", notice.message),
            Level::Error => error!("{}", notice.message),
        }
        if self.tx.send(notice).is_err() {
            trace!("notice surface is gone");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(Notice::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(Notice::error(message));
    }

    /// Reports a failed request. [GatewayError::Unauthorized] is not
    /// reported: the login boundary already tells the story.
    pub fn failure(&self, context: &str, e: &GatewayError) {
        if e.is_unauthorized() {
            return;
        }
        self.error(format!("{}: {}", context, e));
    }
}

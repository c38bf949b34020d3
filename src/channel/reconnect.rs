use std::time::Duration;

/// Exponential backoff: `min(base * 2^attempt, cap)`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,

    /// Number of reconnection attempts before giving up
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnection `attempt` (0 based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Live channel state, as shown by the connectivity indicator
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    ClosedRetrying {
        attempt: u32,
        delay: Duration,
    },
    ClosedExhausted,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "connected"),
            Self::ClosedRetrying { attempt, delay } => write!(
                f,
                "disconnected (retry #{} in {:.1}s)",
                attempt,
                delay.as_secs_f64()
            ),
            Self::ClosedExhausted => write!(f, "disconnected"),
        }
    }
}

/// What to do after a close
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Next {
    Retry(Duration),
    Exhausted,
}

/// Pure reconnection state machine. Does not sleep.
#[derive(Debug, Clone)]
pub struct Reconnect {
    policy: BackoffPolicy,
    attempt: u32,
    state: ConnectionState,
}

impl Reconnect {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connecting(&mut self) -> ConnectionState {
        self.state = ConnectionState::Connecting;
        self.state
    }

    /// Connection established: resets the attempt counter
    pub fn opened(&mut self) -> ConnectionState {
        self.attempt = 0;
        self.state = ConnectionState::Open;
        self.state
    }

    /// Connection lost or refused
    pub fn closed(&mut self) -> Next {
        if self.attempt >= self.policy.max_attempts {
            self.state = ConnectionState::ClosedExhausted;
            return Next::Exhausted;
        }

        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;

        self.state = ConnectionState::ClosedRetrying {
            attempt: self.attempt,
            delay,
        };

        Next::Retry(delay)
    }
}

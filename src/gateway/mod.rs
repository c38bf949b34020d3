//! Command gateway: authenticated requests with bounded retries.
use std::{sync::Arc, time::Duration};

use hifitime::prelude::Epoch;
use log::{debug, error, warn};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use tokio::sync::mpsc::Sender;

mod commands;
mod credentials;
mod http;

pub use commands::Commands;
pub use credentials::{
    CredentialError, CredentialStore, FileCredentials, LoginBoundary, SessionBoundary,
};
pub use http::ReqwestBackend;

use crate::{clock::Clock, export::ExportError, state::Event};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    #[error("request timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Invalid(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl GatewayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Transport level failure, before any HTTP status
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportFailure {
    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Network(String),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,

    /// Absolute path, for example `/api/devices`
    pub path: String,

    pub body: Option<Value>,
}

impl Request {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Server provided `detail`, or the HTTP reason
    pub fn failure_message(&self) -> String {
        let detail = serde_json::from_slice::<Value>(&self.body)
            .ok()
            .and_then(|body| match body.get("detail")? {
                Value::String(detail) => Some(detail.clone()),
                Value::Array(items) => {
                    let messages = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(Value::as_str))
                        .collect::<Vec<_>>();
                    if messages.is_empty() {
                        None
                    } else {
                        Some(messages.join(", "))
                    }
                },
                _ => None,
            });

        detail.unwrap_or_else(|| {
            StatusCode::from_u16(self.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .map(|reason| reason.to_string())
                .unwrap_or_else(|| format!("HTTP {}", self.status))
        })
    }
}

/// Sends one request attempt
#[async_trait::async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(
        &self,
        request: &Request,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, TransportFailure>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RetrySettings {
    /// Per attempt timeout
    pub timeout: Duration,

    /// Retries on timeout or server failure
    pub retries: u32,

    /// Delay before retrying a server failure
    pub delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct Gateway {
    backend: Arc<dyn HttpBackend>,
    credentials: Arc<dyn CredentialStore>,
    boundary: Arc<dyn LoginBoundary>,
    clock: Arc<dyn Clock>,
    retry: RetrySettings,
    events: Option<Sender<Event>>,
}

impl Gateway {
    /// Builds new [Gateway]
    pub fn new(
        backend: Arc<dyn HttpBackend>,
        credentials: Arc<dyn CredentialStore>,
        boundary: Arc<dyn LoginBoundary>,
        clock: Arc<dyn Clock>,
        retry: RetrySettings,
    ) -> Self {
        Self {
            backend,
            credentials,
            boundary,
            clock,
            retry,
            events: None,
        }
    }

    /// Reports reachability to the controller
    pub fn with_events(mut self, events: Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn now(&self) -> Epoch {
        self.clock.now()
    }

    pub fn has_credentials(&self) -> Result<bool, GatewayError> {
        Ok(self.credentials.token()?.is_some())
    }

    pub fn login(&self, token: &str) -> Result<(), GatewayError> {
        Ok(self.credentials.store(token)?)
    }

    pub fn logout(&self) -> Result<(), GatewayError> {
        Ok(self.credentials.clear()?)
    }

    /// Drops stored credentials and invokes the login boundary
    pub fn end_session(&self) {
        if let Err(e) = self.credentials.clear() {
            error!("failed to clear credentials: {}", e);
        }
        self.boundary.login_required();
    }

    async fn reachable(&self, reachable: bool) {
        if let Some(events) = &self.events {
            let _ = events.send(Event::Reachable(reachable)).await;
        }
    }

    /// Executes `request`. Returns 2xx responses, everything else is a [GatewayError].
    pub async fn execute(&self, request: Request) -> Result<Response, GatewayError> {
        let token = self.credentials.token()?;
        let mut retries = self.retry.retries;

        loop {
            debug!("{} {}", request.method, request.path);

            let attempt = self
                .backend
                .send(&request, token.as_deref(), self.retry.timeout)
                .await;

            match attempt {
                Ok(response) if response.status == 401 => {
                    warn!("{} {}: unauthorized", request.method, request.path);
                    self.reachable(true).await;
                    self.end_session();
                    return Err(GatewayError::Unauthorized);
                },
                Ok(response) if response.status >= 500 && retries > 0 => {
                    warn!(
                        "{} {}: server error ({}), retrying ({} attempts left)",
                        request.method, request.path, response.status, retries
                    );
                    retries -= 1;
                    self.clock.sleep(self.retry.delay).await;
                },
                Ok(response) => {
                    self.reachable(true).await;

                    if response.is_success() {
                        return Ok(response);
                    }

                    return Err(GatewayError::Server {
                        status: response.status,
                        message: response.failure_message(),
                    });
                },
                Err(TransportFailure::Timeout) if retries > 0 => {
                    warn!(
                        "{} {}: timeout, retrying ({} attempts left)",
                        request.method, request.path, retries
                    );
                    retries -= 1;
                },
                Err(TransportFailure::Timeout) => {
                    error!("{} {}: timeout", request.method, request.path);
                    return Err(GatewayError::Timeout);
                },
                Err(TransportFailure::Network(e)) => {
                    error!("{} {}: {}", request.method, request.path, e);
                    self.reachable(false).await;
                    return Err(GatewayError::Network(e));
                },
            }
        }
    }
}

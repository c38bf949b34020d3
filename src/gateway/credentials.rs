use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, error};
use thiserror::Error;
use tokio::sync::watch::Sender as WatchTx;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store \"{path}\": {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persistent bearer token storage
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Result<Option<String>, CredentialError>;
    fn store(&self, token: &str) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

/// [CredentialStore] backed by a local file
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentials {
    fn token(&self) -> Result<Option<String>, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&self, token: &str) -> Result<(), CredentialError> {
        std::fs::write(&self.path, token.trim()).map_err(|e| self.io_error(e))?;
        debug!("token stored in {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("token removed from {}", self.path.display());
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Invoked when the session is no longer authenticated
pub trait LoginBoundary: Send + Sync {
    fn login_required(&self);
}

/// Ends the console session: there is no interactive login,
/// the operator restarts with a fresh `--token`.
#[derive(Debug)]
pub struct SessionBoundary {
    expired: AtomicBool,
    shutdown: WatchTx<bool>,
}

impl SessionBoundary {
    pub fn new(shutdown: WatchTx<bool>) -> Self {
        Self {
            shutdown,
            expired: AtomicBool::new(false),
        }
    }

    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::Relaxed)
    }
}

impl LoginBoundary for SessionBoundary {
    fn login_required(&self) {
        if !self.expired.swap(true, Ordering::Relaxed) {
            error!("authentication required: log in again with --token <TOKEN>");
        }
        self.shutdown.send_replace(true);
    }
}

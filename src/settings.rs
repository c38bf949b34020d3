use std::{path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{
    device::{BaseSetup, UserDraft},
    gateway::RetrySettings,
    skyplot::{MAX_HEIGHT, MAX_WIDTH},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("invalid skyplot size \"{0}\", expecting WIDTHxHEIGHT up to 512x256")]
    SkyplotSize(String),

    #[error("invalid coordinates \"{0}\", expecting LAT,LON,ALT")]
    Coordinates(String),

    #[error("missing subcommand")]
    MissingCommand,
}

/// Operation requested on the command line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive console
    Watch {
        select: Option<String>,
        user_id: Option<i64>,
    },
    Devices {
        user_id: Option<i64>,
    },
    Reset(String),
    Lock(String),
    Unlock(String),
    Delete(String),
    Provision {
        serial: String,
        name: String,
    },
    License {
        serial: String,

        /// Generated when not provided
        key: Option<String>,
    },
    ConfigureChip {
        serial: String,
        setup: BaseSetup,
    },
    ConfigureService {
        serial: String,

        /// JSON description of the output services
        config: PathBuf,
    },
    Export {
        dir: PathBuf,
    },
    Users(UserCommand),
    WhoAmI,
    Logout,
}

/// Operator account management
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    List,
    Add(UserDraft),
    Update { id: i64, draft: UserDraft },
    Remove(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Dashboard base URL
    pub url: String,

    /// Persistent token store
    pub token_file: PathBuf,

    /// Token to store before anything else
    pub token: Option<String>,

    /// Per request timeout
    pub timeout: Duration,

    /// Retries on timeout or 5xx
    pub retries: u32,

    /// Skyplot refresh rate
    pub fps: u32,

    /// Skyplot canvas (columns, rows)
    pub skyplot: (usize, usize),

    pub command: Command,
}

impl Settings {
    pub const DEFAULT_TOKEN_FILE: &'static str = ".cors_dashboard_token";

    pub fn retry(&self) -> RetrySettings {
        RetrySettings {
            timeout: self.timeout,
            retries: self.retries,
            ..Default::default()
        }
    }
}

/// Skyplot size, as `WIDTHxHEIGHT`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CanvasSize(pub usize, pub usize);

impl FromStr for CanvasSize {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettingsError::SkyplotSize(s.to_string());

        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;

        let width = width.trim().parse::<usize>().map_err(|_| invalid())?;
        let height = height.trim().parse::<usize>().map_err(|_| invalid())?;

        if width == 0 || height == 0 || width > MAX_WIDTH || height > MAX_HEIGHT {
            return Err(invalid());
        }

        Ok(Self(width, height))
    }
}

/// Fixed position, as `LAT,LON,ALT`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl FromStr for Position {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|item| item.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SettingsError::Coordinates(s.to_string()))?;

        match values[..] {
            [lat, lon, alt] => Ok(Self { lat, lon, alt }),
            _ => Err(SettingsError::Coordinates(s.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CanvasSize, Position, SettingsError};
    use std::str::FromStr;

    #[test]
    fn canvas_size() {
        assert_eq!(CanvasSize::from_str("41x21"), Ok(CanvasSize(41, 21)));
        assert_eq!(CanvasSize::from_str(" 80X40 "), Ok(CanvasSize(80, 40)));

        assert_eq!(CanvasSize::from_str("512x256"), Ok(CanvasSize(512, 256)));

        for invalid in ["41", "0x21", "41x", "axb", "", "513x21", "41x257", "4294967296x4294967296"] {
            assert_eq!(
                CanvasSize::from_str(invalid),
                Err(SettingsError::SkyplotSize(invalid.to_string())),
            );
        }
    }

    #[test]
    fn fixed_position() {
        assert_eq!(
            Position::from_str("21.02, 105.83,12.5"),
            Ok(Position {
                lat: 21.02,
                lon: 105.83,
                alt: 12.5
            })
        );

        assert_eq!(
            Position::from_str("-33.8,151.2,-4").map(|p| p.lat),
            Ok(-33.8)
        );

        assert!(Position::from_str("21.02,105.83").is_err());
        assert!(Position::from_str("21.02,105.83,1,2").is_err());
        assert!(Position::from_str("north,east,up").is_err());
    }
}

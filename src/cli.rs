use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command, value_parser};

use crate::{
    device::{BaseSetup, UserDraft},
    settings::{CanvasSize, Command as Operation, Position, Settings, SettingsError, UserCommand},
};

use std::{path::PathBuf, time::Duration};

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

fn serial() -> Arg {
    Arg::new("serial")
        .value_name("SERIAL")
        .required(true)
        .help("Station serial number")
}

fn user_id() -> Arg {
    Arg::new("user")
        .long("user")
        .value_name("ID")
        .value_parser(value_parser!(i64))
        .action(ArgAction::Set)
        .help("Restrict to stations owned by this user")
}

fn user_fields(command: Command) -> Command {
    command
        .arg(
            Arg::new("full-name")
                .long("full-name")
                .value_name("NAME")
                .action(ArgAction::Set)
                .help("Full name"),
        )
        .arg(
            Arg::new("role")
                .long("role")
                .value_name("ROLE")
                .action(ArgAction::Set)
                .help("Role, for example \"admin\" or \"operator\""),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .value_name("PASSWORD")
                .action(ArgAction::Set)
                .help("Account password"),
        )
        .arg(
            Arg::new("station")
                .long("station")
                .value_name("SERIAL")
                .action(ArgAction::Append)
                .help("Assign a station to this account. Use as many as needed."),
        )
}

fn user_id_arg() -> Arg {
    Arg::new("id")
        .value_name("ID")
        .value_parser(value_parser!(i64))
        .required(true)
        .help("Account identifier")
}

impl Cli {
    fn command() -> Command {
        Command::new("cors-dashboard")
            .author("CORS network operations")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Operator console for a fleet of GNSS reference stations")
            .color(ColorChoice::Always)
            .arg_required_else_help(true)
            .subcommand_required(true)
            .next_help_heading("Server")
            .arg(
                Arg::new("url")
                    .long("url")
                    .value_name("URL")
                    .required(true)
                    .action(ArgAction::Set)
                    .help("Dashboard base URL. Example: https://cors.example.org"),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .value_name("SECONDS")
                    .value_parser(value_parser!(u64))
                    .default_value("30")
                    .help("Per request timeout, in seconds"),
            )
            .arg(
                Arg::new("retries")
                    .long("retries")
                    .value_name("N")
                    .value_parser(value_parser!(u32))
                    .default_value("3")
                    .help("Number of retries on timeout or server failure"),
            )
            .next_help_heading("Authentication")
            .arg(
                Arg::new("token-file")
                    .long("token-file")
                    .value_name("PATH")
                    .default_value(Settings::DEFAULT_TOKEN_FILE)
                    .help("Where the session token is stored"),
            )
            .arg(
                Arg::new("token")
                    .long("token")
                    .value_name("TOKEN")
                    .action(ArgAction::Set)
                    .help("Store this token before running the command (log in)"),
            )
            .next_help_heading("Skyplot")
            .arg(
                Arg::new("fps")
                    .long("fps")
                    .value_name("N")
                    .value_parser(value_parser!(u32).range(1..=60))
                    .default_value("4")
                    .help("Skyplot refresh rate"),
            )
            .arg(
                Arg::new("skyplot")
                    .long("skyplot")
                    .value_name("WxH")
                    .default_value("41x21")
                    .help("Skyplot size, in terminal cells"),
            )
            .subcommand(
                Command::new("watch")
                    .about("Interactive console: live station list, details and skyplot.
Type `select <serial>`, `clear`, `tab <surface>` or `quit` on stdin.")
                    .arg(
                        Arg::new("select")
                            .long("select")
                            .value_name("SERIAL")
                            .action(ArgAction::Set)
                            .help("Station selected on startup"),
                    )
                    .arg(user_id()),
            )
            .subcommand(
                Command::new("devices")
                    .about("List stations")
                    .arg(user_id()),
            )
            .subcommand(
                Command::new("reset")
                    .about("Wipe the station configuration and reboot it")
                    .arg(serial()),
            )
            .subcommand(Command::new("lock").about("Lock a station").arg(serial()))
            .subcommand(Command::new("unlock").about("Unlock a station").arg(serial()))
            .subcommand(
                Command::new("delete")
                    .about("Remove a station from the list. This does not reset the station.")
                    .arg(serial()),
            )
            .subcommand(
                Command::new("provision")
                    .about("Name and provision a licensed station")
                    .arg(serial())
                    .arg(
                        Arg::new("name")
                            .value_name("NAME")
                            .required(true)
                            .help("Station name"),
                    ),
            )
            .subcommand(
                Command::new("license")
                    .about("Deploy a license key. A new key is generated when none is given.")
                    .arg(serial())
                    .arg(
                        Arg::new("key")
                            .long("key")
                            .value_name("KEY")
                            .action(ArgAction::Set)
                            .help("License key to deploy"),
                    ),
            )
            .subcommand(
                Command::new("configure-chip")
                    .about("Configure the base position of the GNSS receiver")
                    .arg(serial())
                    .arg(
                        Arg::new("fixed")
                            .long("fixed")
                            .value_name("LAT,LON,ALT")
                            .allow_hyphen_values(true)
                            .conflicts_with("survey-in")
                            .required_unless_present("survey-in")
                            .help("Known position: latitude and longitude in degrees, altitude in meters"),
                    )
                    .arg(
                        Arg::new("survey-in")
                            .long("survey-in")
                            .value_name("SECONDS")
                            .value_parser(value_parser!(u32))
                            .required_unless_present("fixed")
                            .help("Survey the position in, for that many seconds"),
                    )
                    .arg(
                        Arg::new("accuracy")
                            .long("accuracy")
                            .value_name("MM")
                            .value_parser(value_parser!(f64))
                            .default_value("10")
                            .help("Position accuracy, in millimeters"),
                    ),
            )
            .subcommand(
                Command::new("configure-service")
                    .about("Deploy output services (NTRIP casters, RTCM input)")
                    .arg(serial())
                    .arg(
                        Arg::new("config")
                            .value_name("FILE")
                            .required(true)
                            .help("JSON service configuration"),
                    ),
            )
            .subcommand(
                Command::new("export")
                    .about("Download the station list as CSV")
                    .arg(
                        Arg::new("dir")
                            .long("dir")
                            .value_name("DIR")
                            .default_value(".")
                            .help("Output directory"),
                    ),
            )
            .subcommand(
                Command::new("users")
                    .about("Manage operator accounts")
                    .subcommand_required(true)
                    .subcommand(Command::new("list").about("List accounts"))
                    .subcommand(user_fields(
                        Command::new("add").about("Create an account").arg(
                            Arg::new("username")
                                .value_name("USERNAME")
                                .required(true)
                                .help("Login name"),
                        ),
                    ))
                    .subcommand(user_fields(
                        Command::new("update")
                            .about("Update an account")
                            .arg(user_id_arg())
                            .arg(
                                Arg::new("active")
                                    .long("active")
                                    .value_name("BOOL")
                                    .value_parser(value_parser!(bool))
                                    .help("Enable or disable the account"),
                            ),
                    ))
                    .subcommand(
                        Command::new("remove")
                            .about("Delete an account")
                            .arg(user_id_arg()),
                    ),
            )
            .subcommand(Command::new("whoami").about("Show the authenticated operator"))
            .subcommand(Command::new("logout").about("Forget the stored token"))
    }

    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: Self::command().get_matches(),
        }
    }

    #[cfg(test)]
    fn from_args(args: &[&str]) -> Result<Self, clap::Error> {
        Ok(Self {
            matches: Self::command().try_get_matches_from(args)?,
        })
    }

    fn string(matches: &ArgMatches, name: &str) -> Option<String> {
        matches.try_get_one::<String>(name).ok().flatten().cloned()
    }

    fn serial(matches: &ArgMatches) -> String {
        Self::string(matches, "serial").unwrap_or_default()
    }

    fn user_draft(matches: &ArgMatches) -> UserDraft {
        UserDraft {
            username: Self::string(matches, "username"),
            full_name: Self::string(matches, "full-name"),
            role: Self::string(matches, "role"),
            password: Self::string(matches, "password"),
            is_active: matches
                .try_get_one::<bool>("active")
                .ok()
                .flatten()
                .copied(),
            assigned_devices: matches
                .get_many::<String>("station")
                .map(|serials| serials.cloned().collect()),
        }
    }

    fn user_command(matches: &ArgMatches) -> Result<UserCommand, SettingsError> {
        let id = |matches: &ArgMatches| matches.get_one::<i64>("id").copied().unwrap_or_default();

        match matches.subcommand() {
            Some(("list", _)) => Ok(UserCommand::List),
            Some(("add", matches)) => Ok(UserCommand::Add(Self::user_draft(matches))),
            Some(("update", matches)) => Ok(UserCommand::Update {
                id: id(matches),
                draft: Self::user_draft(matches),
            }),
            Some(("remove", matches)) => Ok(UserCommand::Remove(id(matches))),
            _ => Err(SettingsError::MissingCommand),
        }
    }

    fn operation(&self) -> Result<Operation, SettingsError> {
        let Some((name, matches)) = self.matches.subcommand() else {
            return Err(SettingsError::MissingCommand);
        };

        let operation = match name {
            "watch" => Operation::Watch {
                select: Self::string(matches, "select"),
                user_id: matches.get_one::<i64>("user").copied(),
            },
            "devices" => Operation::Devices {
                user_id: matches.get_one::<i64>("user").copied(),
            },
            "reset" => Operation::Reset(Self::serial(matches)),
            "lock" => Operation::Lock(Self::serial(matches)),
            "unlock" => Operation::Unlock(Self::serial(matches)),
            "delete" => Operation::Delete(Self::serial(matches)),
            "provision" => Operation::Provision {
                serial: Self::serial(matches),
                name: Self::string(matches, "name").unwrap_or_default(),
            },
            "license" => Operation::License {
                serial: Self::serial(matches),
                key: Self::string(matches, "key"),
            },
            "configure-chip" => {
                let accuracy_mm = matches.get_one::<f64>("accuracy").copied().unwrap_or(10.0);

                let setup = match Self::string(matches, "fixed") {
                    Some(fixed) => {
                        let position = fixed.parse::<Position>()?;
                        BaseSetup::FixedLla {
                            lat: position.lat,
                            lon: position.lon,
                            alt: position.alt,
                            accuracy_mm,
                        }
                    },
                    None => BaseSetup::SurveyIn {
                        duration_s: matches.get_one::<u32>("survey-in").copied().unwrap_or(0),
                        accuracy_mm,
                    },
                };

                Operation::ConfigureChip {
                    serial: Self::serial(matches),
                    setup,
                }
            },
            "configure-service" => Operation::ConfigureService {
                serial: Self::serial(matches),
                config: PathBuf::from(Self::string(matches, "config").unwrap_or_default()),
            },
            "export" => Operation::Export {
                dir: PathBuf::from(Self::string(matches, "dir").unwrap_or_else(|| ".".to_string())),
            },
            "users" => Operation::Users(Self::user_command(matches)?),
            "whoami" => Operation::WhoAmI,
            "logout" => Operation::Logout,
            _ => return Err(SettingsError::MissingCommand),
        };

        Ok(operation)
    }

    /// Collects [Settings] from the command line
    pub fn settings(&self) -> Result<Settings, SettingsError> {
        let skyplot = self
            .matches
            .get_one::<String>("skyplot")
            .map(|s| s.parse::<CanvasSize>())
            .transpose()?
            .unwrap_or(CanvasSize(41, 21));

        Ok(Settings {
            url: Self::string(&self.matches, "url")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            token_file: PathBuf::from(
                Self::string(&self.matches, "token-file")
                    .unwrap_or_else(|| Settings::DEFAULT_TOKEN_FILE.to_string()),
            ),
            token: Self::string(&self.matches, "token"),
            timeout: Duration::from_secs(
                self.matches.get_one::<u64>("timeout").copied().unwrap_or(30),
            ),
            retries: self.matches.get_one::<u32>("retries").copied().unwrap_or(3),
            fps: self.matches.get_one::<u32>("fps").copied().unwrap_or(4),
            skyplot: (skyplot.0, skyplot.1),
            command: self.operation()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::Cli;
    use crate::{
        device::{BaseSetup, UserDraft},
        settings::{Command, Settings, SettingsError, UserCommand},
    };
    use std::{path::PathBuf, time::Duration};

    fn settings(args: &[&str]) -> Result<Settings, SettingsError> {
        Cli::from_args(args).unwrap().settings()
    }

    #[test]
    fn defaults() {
        let settings = settings(&["cors-dashboard", "--url", "https://cors.example.org/", "watch"])
            .unwrap();

        assert_eq!(settings.url, "https://cors.example.org");
        assert_eq!(settings.token_file, PathBuf::from(".cors_dashboard_token"));
        assert_eq!(settings.token, None);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.retries, 3);
        assert_eq!(settings.fps, 4);
        assert_eq!(settings.skyplot, (41, 21));
        assert_eq!(
            settings.command,
            Command::Watch {
                select: None,
                user_id: None
            }
        );
    }

    #[test]
    fn global_options() {
        let settings = settings(&[
            "cors-dashboard",
            "--url",
            "http://localhost:8000",
            "--token",
            "abc",
            "--token-file",
            "/tmp/token",
            "--timeout",
            "5",
            "--retries",
            "1",
            "--skyplot",
            "61x31",
            "watch",
            "--select",
            "PI-1",
            "--user",
            "7",
        ])
        .unwrap();

        assert_eq!(settings.token.as_deref(), Some("abc"));
        assert_eq!(settings.token_file, PathBuf::from("/tmp/token"));
        assert_eq!(settings.retry().timeout, Duration::from_secs(5));
        assert_eq!(settings.retry().retries, 1);
        assert_eq!(settings.skyplot, (61, 31));
        assert_eq!(
            settings.command,
            Command::Watch {
                select: Some("PI-1".to_string()),
                user_id: Some(7)
            }
        );
    }

    #[test]
    fn url_is_required() {
        assert!(Cli::from_args(&["cors-dashboard", "watch"]).is_err());
    }

    #[test]
    fn station_commands() {
        let url = ["cors-dashboard", "--url", "http://localhost"];
        let parse = |tail: &[&str]| {
            let args = url.iter().chain(tail.iter()).copied().collect::<Vec<_>>();
            settings(&args).unwrap().command
        };

        assert_eq!(parse(&["reset", "PI-1"]), Command::Reset("PI-1".to_string()));
        assert_eq!(parse(&["unlock", "PI-1"]), Command::Unlock("PI-1".to_string()));
        assert_eq!(
            parse(&["provision", "PI-1", "Hanoi base"]),
            Command::Provision {
                serial: "PI-1".to_string(),
                name: "Hanoi base".to_string()
            }
        );
        assert_eq!(
            parse(&["license", "PI-1"]),
            Command::License {
                serial: "PI-1".to_string(),
                key: None
            }
        );
        assert_eq!(
            parse(&["configure-chip", "PI-1", "--fixed", "-33.8,151.2,20", "--accuracy", "20"]),
            Command::ConfigureChip {
                serial: "PI-1".to_string(),
                setup: BaseSetup::FixedLla {
                    lat: -33.8,
                    lon: 151.2,
                    alt: 20.0,
                    accuracy_mm: 20.0,
                }
            }
        );
        assert_eq!(
            parse(&["configure-chip", "PI-1", "--survey-in", "300"]),
            Command::ConfigureChip {
                serial: "PI-1".to_string(),
                setup: BaseSetup::SurveyIn {
                    duration_s: 300,
                    accuracy_mm: 10.0,
                }
            }
        );
        assert_eq!(
            parse(&["export"]),
            Command::Export {
                dir: PathBuf::from(".")
            }
        );
        assert_eq!(parse(&["whoami"]), Command::WhoAmI);
    }

    #[test]
    fn user_commands() {
        let parse = |tail: &[&str]| {
            let args = ["cors-dashboard", "--url", "http://localhost", "users"]
                .iter()
                .chain(tail.iter())
                .copied()
                .collect::<Vec<_>>();
            settings(&args).unwrap().command
        };

        assert_eq!(parse(&["list"]), Command::Users(UserCommand::List));
        assert_eq!(parse(&["remove", "4"]), Command::Users(UserCommand::Remove(4)));

        assert_eq!(
            parse(&["add", "ops", "--password", "secret", "--station", "A", "--station", "B"]),
            Command::Users(UserCommand::Add(UserDraft {
                username: Some("ops".to_string()),
                password: Some("secret".to_string()),
                assigned_devices: Some(vec!["A".to_string(), "B".to_string()]),
                ..Default::default()
            }))
        );

        assert_eq!(
            parse(&["update", "4", "--active", "false", "--role", "operator"]),
            Command::Users(UserCommand::Update {
                id: 4,
                draft: UserDraft {
                    role: Some("operator".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                }
            })
        );
    }

    #[test]
    fn invalid_values() {
        assert!(
            Cli::from_args(&[
                "cors-dashboard",
                "--url",
                "http://localhost",
                "configure-chip",
                "PI-1",
            ])
            .is_err()
        );

        assert!(matches!(
            settings(&[
                "cors-dashboard",
                "--url",
                "http://localhost",
                "configure-chip",
                "PI-1",
                "--fixed",
                "21.0,105.8",
            ]),
            Err(SettingsError::Coordinates(_))
        ));

        assert!(matches!(
            settings(&[
                "cors-dashboard",
                "--url",
                "http://localhost",
                "--skyplot",
                "big",
                "whoami",
            ]),
            Err(SettingsError::SkyplotSize(_))
        ));
    }
}

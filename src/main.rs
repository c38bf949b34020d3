#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

use std::{path::Path, sync::Arc};

use env_logger::{Builder, Target};

use log::{error, info, warn};

use thiserror::Error;

use tokio::{
    signal,
    sync::{
        mpsc::{self, UnboundedReceiver},
        watch,
    },
};

mod channel;
mod cli;
mod clock;
mod device;
mod export;
mod gateway;
mod notice;
mod runtime;
mod settings;
mod skyplot;
mod state;
mod view;

use crate::{
    channel::{BackoffPolicy, ChannelError, LiveChannel, WsTransport},
    cli::Cli,
    clock::{Clock, SystemClock},
    device::{BaseSetup, Device, ServiceConfig},
    gateway::{
        Commands, FileCredentials, Gateway, GatewayError, LoginBoundary, ReqwestBackend,
        SessionBoundary,
    },
    notice::{Notice, Notices},
    runtime::{Prompt, Runtime},
    settings::{Command, Settings, SettingsError, UserCommand},
    state::Event,
    view::terminal::Presenter,
};

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid service configuration: {0}")]
    ServiceConfig(#[from] serde_json::Error),

    #[error("authentication required: log in with --token <TOKEN>")]
    LoginRequired,
}

fn print_notices(notices: &mut UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        println!("{}", notice);
    }
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No stations yet.");
    }
    for device in devices.iter() {
        println!(
            "{:<20} {:<16} {:<14} {:>10} {} {}{}",
            device.name,
            device.status.label(),
            device.serial,
            device.throughput(),
            if device.ntrip_connected { "NTRIP" } else { "-----" },
            device.chip_type(),
            if device.is_locked { " LOCKED" } else { "" },
        );
    }
}

/// Interactive console. Returns once the operator quits,
/// on Ctrl-C, or when the session expires.
async fn console(
    settings: &Settings,
    clock: Arc<dyn Clock>,
    commands: Commands,
    notices: Notices,
    notices_rx: UnboundedReceiver<Notice>,
    (events_tx, events_rx): (mpsc::Sender<Event>, mpsc::Receiver<Event>),
    (shutdown_tx, shutdown_rx): (watch::Sender<bool>, watch::Receiver<bool>),
) -> Result<(), Error> {
    let (select, user_id) = match &settings.command {
        Command::Watch { select, user_id } => (select.clone(), *user_id),
        _ => (None, None),
    };

    let (mut runtime, snapshots) =
        Runtime::new(clock.clone(), events_rx, notices.clone(), shutdown_rx.clone());

    let (layout_tx, layout_rx) = watch::channel(settings.skyplot);

    let mut presenter = Presenter::new(
        snapshots.clone(),
        notices_rx,
        layout_rx,
        shutdown_rx.clone(),
        settings.fps,
    );

    let user = commands.current_user().await?;
    info!("logged in as {}", user.display_name());
    let _ = events_tx.send(Event::User(user)).await;

    let devices = commands.load_devices(user_id).await?;
    let _ = events_tx.send(Event::Loaded(devices)).await;

    if let Some(serial) = select {
        let _ = events_tx.send(Event::Select(Some(serial))).await;
    }

    let controller = tokio::spawn(async move { runtime.run().await });

    let transport = Arc::new(WsTransport::new(&settings.url)?);
    let mut channel = LiveChannel::new(
        transport,
        clock,
        BackoffPolicy::default(),
        events_tx.clone(),
        notices,
        shutdown_rx,
    );

    let live = tokio::spawn(async move {
        if let Err(e) = channel.run().await {
            error!("live updates: {}", e);
        }
    });

    let prompt = Prompt::new(
        tokio::io::stdin(),
        events_tx,
        snapshots,
        commands,
        layout_tx,
        shutdown_tx.clone(),
    );
    tokio::spawn(prompt.run());

    let interrupt = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(_) => info!("interrupted"),
            Err(e) => error!("signal handling: {}", e),
        }
        interrupt.send_replace(true);
    });

    presenter.run().await;

    shutdown_tx.send_replace(true);

    if let Err(e) = controller.await {
        error!("controller: {}", e);
    }
    if let Err(e) = live.await {
        error!("live updates: {}", e);
    }

    Ok(())
}

async fn configure_chip(
    commands: &Commands,
    serial: &str,
    setup: &BaseSetup,
) -> Result<(), Error> {
    let devices = commands.load_devices(None).await?;

    let Some(device) = devices.iter().find(|device| device.serial == serial) else {
        return Err(GatewayError::Invalid(format!("unknown station \"{}\"", serial)).into());
    };

    commands.configure_chip(device, setup).await?;
    Ok(())
}

fn service_config(path: &Path) -> Result<ServiceConfig, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

async fn users(commands: &Commands, command: &UserCommand) -> Result<(), Error> {
    match command {
        UserCommand::List => {
            for user in commands.list_users().await?.iter() {
                println!(
                    "{:>4} {:<16} {:<24} {:<10} {:<8} {}",
                    user.id,
                    user.username,
                    user.full_name.as_deref().unwrap_or(""),
                    user.role,
                    if user.is_active { "active" } else { "inactive" },
                    user.assigned_devices.join(","),
                );
            }
        },
        UserCommand::Add(draft) => {
            let user = commands.create_user(draft).await?;
            info!("created user {} ({})", user.username, user.id);
        },
        UserCommand::Update { id, draft } => {
            commands.update_user(*id, draft).await?;
        },
        UserCommand::Remove(id) => {
            commands.delete_user(*id).await?;
        },
    }
    Ok(())
}

async fn execute(settings: Settings) -> Result<(), Error> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let credentials = Arc::new(FileCredentials::new(&settings.token_file));
    let boundary = Arc::new(SessionBoundary::new(shutdown_tx.clone()));
    let backend = Arc::new(ReqwestBackend::new(&settings.url)?);

    let (events_tx, events_rx) = mpsc::channel(128);
    let (notices, mut notices_rx) = Notices::new();

    let mut gateway = Gateway::new(
        backend,
        credentials,
        boundary.clone(),
        clock.clone(),
        settings.retry(),
    );

    if matches!(settings.command, Command::Watch { .. }) {
        gateway = gateway.with_events(events_tx.clone());
    }

    if let Some(token) = &settings.token {
        gateway.login(token)?;
        info!("token stored in {}", settings.token_file.display());
    }

    if settings.command == Command::Logout {
        gateway.logout()?;
        info!("logged out");
        return Ok(());
    }

    if !gateway.has_credentials()? {
        boundary.login_required();
        return Err(Error::LoginRequired);
    }

    let gateway = Arc::new(gateway);
    let commands = Commands::new(gateway, notices.clone());

    if let Command::Watch { .. } = &settings.command {
        let commands = commands.with_events(events_tx.clone());

        let outcome = console(
            &settings,
            clock,
            commands,
            notices,
            notices_rx,
            (events_tx, events_rx),
            (shutdown_tx, shutdown_rx),
        )
        .await;

        if boundary.expired() {
            return Err(Error::LoginRequired);
        }
        return outcome;
    }

    let outcome = match &settings.command {
        Command::Devices { user_id } => commands
            .load_devices(*user_id)
            .await
            .map(|devices| print_devices(&devices))
            .map_err(Error::from),
        Command::Reset(serial) => commands.reset(serial).await.map_err(Error::from),
        Command::Lock(serial) => commands.lock(serial).await.map_err(Error::from),
        Command::Unlock(serial) => commands.unlock(serial).await.map_err(Error::from),
        Command::Delete(serial) => commands.delete(serial).await.map_err(Error::from),
        Command::Provision { serial, name } => {
            commands.provision(serial, name).await.map_err(Error::from)
        },
        Command::License { serial, key } => commands
            .license(serial, key.as_deref())
            .await
            .map_err(Error::from),
        Command::ConfigureChip { serial, setup } => configure_chip(&commands, serial, setup).await,
        Command::ConfigureService { serial, config } => match service_config(config) {
            Ok(config) => commands
                .configure_service(serial, &config)
                .await
                .map_err(Error::from),
            Err(e) => Err(e),
        },
        Command::Export { dir } => match commands.current_user().await {
            Ok(user) => commands
                .export_csv(&user, dir)
                .await
                .map(|_| ())
                .map_err(Error::from),
            Err(e) => Err(e.into()),
        },
        Command::Users(command) => users(&commands, command).await,
        Command::WhoAmI => commands
            .current_user()
            .await
            .map(|user| {
                println!("{}", user.display_name());
                if !user.permissions.is_empty() {
                    println!("permissions: {}", user.permissions.join(", "));
                }
            })
            .map_err(Error::from),
        Command::Watch { .. } | Command::Logout => Ok(()),
    };

    print_notices(&mut notices_rx);

    if boundary.expired() {
        warn!("session expired");
        return Err(Error::LoginRequired);
    }

    outcome
}

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cli = Cli::new();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        },
    };

    let code = match execute(settings).await {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            1
        },
    };

    // stdin reader may still be parked on a blocking read
    std::process::exit(code);
}

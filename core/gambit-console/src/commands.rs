//! Subcommand implementations.

use crate::format;
use crate::{Cli, Commands, MissionAction, RecordAction, SettingsAction};
use gambit_client::{
    ClientConfig, ClientError, CommandClient, FileTokenStore, ProgressFn, RealtimeClient,
    StorageConfig, TokenStore,
};
use gambit_protocol::{event_names, FlightQuery, RealtimeEvent, SettingValue};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File I/O; `fs_err` already names the path in the message.
    #[error(transparent)]
    File(io::Error),

    #[error("{0}")]
    Input(String),
}

pub type CliResult<T> = std::result::Result<T, CliError>;

pub fn run(cli: Cli, storage: &StorageConfig) -> CliResult<()> {
    let config = resolve_config(storage, cli.api_url, cli.ws_url)?;
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(storage.token_file()));
    tracing::debug!(api = %config.api_base_url, ws = %config.ws_base_url, "Resolved configuration");

    if let Commands::Watch { seconds } = cli.command {
        return watch(&config, tokens, seconds.map(Duration::from_secs));
    }

    let client = CommandClient::new(&config, tokens)?;
    let mut out = io::stdout().lock();
    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            let auth = client.login(&username, &password)?;
            line(&mut out, format!("logged in as {} ({:?})", auth.user.username, auth.user.role))
        }
        Commands::Logout => {
            client.logout();
            line(&mut out, "logged out")
        }
        Commands::Whoami => {
            let user = client.get_current_user()?;
            line(&mut out, format!("{} ({:?}) id={}", user.username, user.role, user.id))
        }
        Commands::Health => line(&mut out, format::health(&client.get_health()?)),
        Commands::Mission { action } => {
            let mission = match action {
                MissionAction::Start => client.start_mission()?,
                MissionAction::Abort => client.abort_mission()?,
                MissionAction::Status => client.get_mission_status()?,
            };
            line(&mut out, format::mission(&mission))
        }
        Commands::Flights {
            limit,
            offset,
            order,
        } => {
            let flights = client.get_flights(FlightQuery {
                limit,
                offset,
                order: order.map(Into::into),
            })?;
            if flights.is_empty() {
                return line(&mut out, "no flights");
            }
            for flight in &flights {
                line(&mut out, format::flight(flight))?;
            }
            Ok(())
        }
        Commands::Report { id, output } => {
            let report = client.get_flight_report(&id)?;
            match output {
                Some(path) => {
                    write_file(&path, report.as_bytes())?;
                    line(&mut out, format!("report saved to {}", path.display()))
                }
                None => line(&mut out, report),
            }
        }
        Commands::Logs { id, output } => {
            let logs = client.download_flight_logs(&id)?;
            write_file(&output, &logs)?;
            line(
                &mut out,
                format!("{} written to {}", format::bytes(logs.len() as u64), output.display()),
            )
        }
        Commands::Record { action } => {
            match action {
                RecordAction::Start => client.start_recording()?,
                RecordAction::Stop => client.stop_recording()?,
            }
            let verb = match action {
                RecordAction::Start => "started",
                RecordAction::Stop => "stopped",
            };
            line(&mut out, format!("recording {}", verb))
        }
        Commands::Settings { action } => match action {
            SettingsAction::List => {
                for setting in client.get_settings()? {
                    line(&mut out, format::setting(&setting))?;
                }
                Ok(())
            }
            SettingsAction::Set { key, value } => {
                let updated = client.update_setting(&key, SettingValue::parse(&value))?;
                line(&mut out, format::setting(&updated))
            }
        },
        Commands::Upload { path } => {
            let progress: ProgressFn = Box::new(|percent: f64| {
                eprint!("\ruploading {:>5.1}%", percent);
            });
            let upload_id = client.upload_file(&path, Some(progress))?;
            eprintln!();
            line(&mut out, format!("upload id {}", upload_id))
        }
        Commands::UploadStatus { id } => {
            let status = client.get_upload_status(&id)?;
            line(&mut out, format!("{} ({})", status.status, format::percent(status.progress)))
        }
        Commands::VideoUrl => line(&mut out, client.video_stream_url()),
        Commands::Watch { .. } => Ok(()),
    }
}

fn resolve_config(
    storage: &StorageConfig,
    api_url: Option<String>,
    ws_url: Option<String>,
) -> CliResult<ClientConfig> {
    let mut config = ClientConfig::load(storage)?;
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    if let Some(url) = ws_url {
        config.ws_base_url = url;
    }
    config.validate()?;
    Ok(config)
}

fn watch(config: &ClientConfig, tokens: Arc<dyn TokenStore>, limit: Option<Duration>) -> CliResult<()> {
    let realtime = RealtimeClient::start(config, tokens)?;
    for name in [
        event_names::INDICATORS,
        event_names::RECORD_STATUS,
        event_names::MISSION_STATUS,
        event_names::RECORD_DONE,
        event_names::CONNECTION,
    ] {
        realtime.on(name, print_event);
    }
    realtime.connect()?;

    match limit {
        Some(limit) => thread::sleep(limit),
        None => loop {
            thread::sleep(Duration::from_secs(3600));
        },
    }
    realtime.shutdown();
    Ok(())
}

fn print_event(event: &RealtimeEvent) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", format::event(event));
    let _ = out.flush();
}

fn read_password() -> CliResult<String> {
    eprint!("password: ");
    let _ = io::stderr().flush();
    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|err| CliError::Input(format!("failed to read password: {}", err)))?;
    let password = input.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(CliError::Input("password must not be empty".to_string()));
    }
    Ok(password)
}

fn write_file(path: &Path, contents: &[u8]) -> CliResult<()> {
    fs_err::write(path, contents).map_err(CliError::File)
}

fn line(out: &mut impl Write, text: impl std::fmt::Display) -> CliResult<()> {
    writeln!(out, "{}", text).map_err(|source| CliError::Io {
        path: PathBuf::from("<stdout>"),
        source,
    })
}

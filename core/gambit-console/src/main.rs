//! gambit: operator command line for the Gambit mission-control backend.
//!
//! Each subcommand maps onto one command-client call, except `watch`, which
//! follows the realtime feed. Command output goes to stdout; diagnostics go
//! to the log file under `<storage root>/logs/`.

mod commands;
mod format;
mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use gambit_client::StorageConfig;
use gambit_protocol::SortOrder;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gambit")]
#[command(about = "Gambit mission control from the terminal")]
#[command(version)]
pub struct Cli {
    /// Backend REST base URL (overrides config and GAMBIT_API_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Backend WebSocket base URL (overrides config and GAMBIT_WS_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session token
    Login {
        username: String,

        /// Password; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session token
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Show vehicle health
    Health,

    /// Start, abort or inspect the mission
    Mission {
        #[command(subcommand)]
        action: MissionAction,
    },

    /// List past flights
    Flights {
        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,

        #[arg(long, value_enum)]
        order: Option<Order>,
    },

    /// Print or save a flight report
    Report {
        #[arg(value_name = "FLIGHT_ID")]
        id: String,

        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Download a flight's logs
    Logs {
        #[arg(value_name = "FLIGHT_ID")]
        id: String,

        #[arg(long, short, value_name = "FILE")]
        output: PathBuf,
    },

    /// Start or stop video recording
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// List or change vehicle settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Upload a file to the backend
    Upload {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Show processing status of an upload
    UploadStatus {
        #[arg(value_name = "UPLOAD_ID")]
        id: String,
    },

    /// Print the live video stream URL
    VideoUrl,

    /// Follow realtime events
    Watch {
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum MissionAction {
    Start,
    Abort,
    Status,
}

#[derive(Subcommand, Clone, Copy)]
pub enum RecordAction {
    Start,
    Stop,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    List,
    /// Set a value (parsed as bool, then number, then text)
    Set { key: String, value: String },
}

#[derive(ValueEnum, Clone, Copy)]
pub enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage.logs_dir());

    if let Err(e) = commands::run(cli, &storage) {
        tracing::error!(error = %e, "gambit command failed");
        eprintln!("gambit: {}", e);
        std::process::exit(1);
    }
}

//! # gambit-client
//!
//! Client library for the Gambit mission-control backend: a command client
//! for the REST surface and a realtime client for the event feed.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Blocking HTTP, and the
//!   realtime feed runs on its own threads.
//! - **One session**: Both clients share a [`TokenStore`]; the token survives
//!   restarts and is removed on logout.
//! - **Errors are values**: REST failures come back as [`ClientError`];
//!   realtime failures only drive the reconnect state machine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gambit_client::{ClientConfig, CommandClient, FileTokenStore, RealtimeClient, StorageConfig};
//! use std::sync::Arc;
//!
//! let storage = StorageConfig::default();
//! let config = ClientConfig::load(&storage)?;
//! let tokens = Arc::new(FileTokenStore::new(storage.token_file()));
//!
//! let commands = CommandClient::new(&config, tokens.clone())?;
//! commands.login("pilot", "secret")?;
//!
//! let realtime = RealtimeClient::start(&config, tokens)?;
//! realtime.on_mission_status(|mission| println!("{}", mission.status));
//! realtime.connect()?;
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod realtime;
pub mod storage;
pub mod token;

pub use command::{CommandClient, HttpTransport, ProgressFn, ReqwestTransport};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use realtime::{ConnectionState, Observers, RealtimeClient, Subscription};
pub use storage::StorageConfig;
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};

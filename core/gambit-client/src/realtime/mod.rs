//! Realtime sync client: a reconnecting WebSocket feed of backend events.
//!
//! [`SyncEngine`] holds the connection state machine and is free of I/O.
//! [`RealtimeClient`] runs it on a dedicated loop thread with a
//! `tungstenite` connector and thread-backed reconnect timers.

mod engine;
mod observers;
mod service;
mod socket;
mod timer;

pub use engine::{ConnectionId, ConnectionState, Connector, Input, Scheduler, SyncEngine, TimerId};
pub use observers::{ObserverId, Observers, Subscription};
pub use service::RealtimeClient;
pub use socket::WsConnector;
pub use timer::ThreadScheduler;

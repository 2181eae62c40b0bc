//! Connection state machine for the realtime channel.
//!
//! The engine performs no I/O itself. Sockets are opened and closed through a
//! [`Connector`], reconnect timers through a [`Scheduler`], and everything that
//! happens afterwards comes back as an [`Input`]. Each socket and each timer
//! carries an id; inputs whose id is no longer current are ignored, which is
//! what keeps at most one socket live and at most one timer pending.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──Opened──▶ Open
//!   ▲                   │                    │
//!   │              Closed/Failed        Closed/Failed
//!   │                   ▼                    │
//!   └──disconnect─── Closed ◀────────────────┘
//!                       │
//!                  TimerFired ──▶ Connecting
//! ```

use super::observers::Observers;
use crate::error::{ClientError, Result};
use gambit_protocol::{parse_frame, RealtimeEvent, REALTIME_PATH, TOKEN_QUERY_PARAM};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

pub type ConnectionId = u64;
pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or deliberately disconnected.
    Idle,
    Connecting,
    Open,
    /// Dropped by the peer or the network; a reconnect is pending.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Opened {
        conn: ConnectionId,
    },
    Frame {
        conn: ConnectionId,
        text: String,
    },
    Closed {
        conn: ConnectionId,
        reason: Option<String>,
    },
    Failed {
        conn: ConnectionId,
        error: String,
    },
    TimerFired {
        timer: TimerId,
    },
}

pub trait Connector {
    /// Starts opening a socket. The outcome arrives later as
    /// [`Input::Opened`], [`Input::Failed`] or [`Input::Closed`].
    fn open(&mut self, conn: ConnectionId, url: &Url) -> Result<()>;

    /// Releases the socket. Closing an unknown or finished id is a no-op.
    fn close(&mut self, conn: ConnectionId);
}

pub trait Scheduler {
    /// Arranges for [`Input::TimerFired`] with `timer` after `delay`.
    fn schedule(&mut self, timer: TimerId, delay: Duration);

    fn cancel(&mut self, timer: TimerId);
}

pub struct SyncEngine<C, S> {
    connector: C,
    scheduler: S,
    observers: Observers,
    endpoint: Url,
    token: Option<String>,
    reconnect_interval: Duration,
    state: ConnectionState,
    published: Arc<RwLock<ConnectionState>>,
    live: Option<ConnectionId>,
    next_conn: ConnectionId,
    pending_timer: Option<TimerId>,
    next_timer: TimerId,
}

impl<C: Connector, S: Scheduler> SyncEngine<C, S> {
    pub fn new(
        ws_base: &Url,
        token: Option<String>,
        reconnect_interval: Duration,
        connector: C,
        scheduler: S,
        observers: Observers,
    ) -> Self {
        let mut endpoint = ws_base.clone();
        if let Ok(mut path) = endpoint.path_segments_mut() {
            path.pop_if_empty()
                .extend(REALTIME_PATH.split('/').filter(|segment| !segment.is_empty()));
        }

        Self {
            connector,
            scheduler,
            observers,
            endpoint,
            token,
            reconnect_interval,
            state: ConnectionState::Idle,
            published: Arc::new(RwLock::new(ConnectionState::Idle)),
            live: None,
            next_conn: 1,
            pending_timer: None,
            next_timer: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// State cell mirrored on every transition, readable from other threads.
    pub fn state_handle(&self) -> Arc<RwLock<ConnectionState>> {
        Arc::clone(&self.published)
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    pub fn live_connection(&self) -> Option<ConnectionId> {
        self.live
    }

    /// Replaces the handshake token. Only later connection attempts use it.
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            tracing::debug!(state = ?self.state, "Realtime connect ignored");
            return;
        }

        self.cancel_reconnect();
        let conn = self.next_conn;
        self.next_conn += 1;
        let url = self.connection_url();

        self.live = Some(conn);
        self.transition(ConnectionState::Connecting);
        tracing::info!(conn, path = %url.path(), "Opening realtime channel");

        if let Err(err) = self.connector.open(conn, &url) {
            tracing::warn!(conn, error = %err, "Failed to start realtime channel");
            self.live = None;
            self.transition(ConnectionState::Closed);
            self.schedule_reconnect();
        }
    }

    /// Tears the channel down and stays down until the next `connect()`.
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();
        let dropped = self.live.take();
        if let Some(conn) = dropped {
            self.connector.close(conn);
            tracing::info!(conn, "Realtime channel closed by client");
        }
        self.transition(ConnectionState::Idle);
        if dropped.is_some() {
            self.observers.emit(&RealtimeEvent::connection(false));
        }
    }

    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Opened { conn } => {
                if !self.is_live(conn) || self.state != ConnectionState::Connecting {
                    tracing::debug!(conn, "Ignoring open from superseded connection");
                    return;
                }
                self.transition(ConnectionState::Open);
                self.cancel_reconnect();
                tracing::info!(conn, "Realtime channel connected");
                self.observers.emit(&RealtimeEvent::connection(true));
            }
            Input::Frame { conn, text } => {
                if !self.is_live(conn) || self.state != ConnectionState::Open {
                    return;
                }
                self.dispatch(&text);
            }
            Input::Closed { conn, reason } => {
                if !self.is_live(conn) {
                    return;
                }
                tracing::info!(conn, reason = reason.as_deref().unwrap_or(""), "Realtime channel disconnected");
                self.drop_connection(conn);
            }
            Input::Failed { conn, error } => {
                if !self.is_live(conn) {
                    return;
                }
                tracing::warn!(conn, error = %error, "Realtime channel error");
                self.drop_connection(conn);
            }
            Input::TimerFired { timer } => {
                if self.pending_timer != Some(timer) {
                    tracing::debug!(timer, "Ignoring cancelled reconnect timer");
                    return;
                }
                self.pending_timer = None;
                tracing::info!("Attempting to reconnect realtime channel");
                self.connect();
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match parse_frame(text) {
            Ok(event) => {
                let delivered = self.observers.emit(&event);
                tracing::trace!(event = event.name(), delivered, "Realtime event dispatched");
            }
            Err(err) => {
                let err = ClientError::from(err);
                tracing::warn!(error = %err, "Dropping realtime frame");
            }
        }
    }

    fn drop_connection(&mut self, conn: ConnectionId) {
        self.connector.close(conn);
        self.live = None;
        self.transition(ConnectionState::Closed);
        self.observers.emit(&RealtimeEvent::connection(false));
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        let timer = self.next_timer;
        self.next_timer += 1;
        self.pending_timer = Some(timer);
        self.scheduler.schedule(timer, self.reconnect_interval);
        tracing::debug!(
            timer,
            delay_ms = self.reconnect_interval.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            self.scheduler.cancel(timer);
        }
    }

    fn is_live(&self, conn: ConnectionId) -> bool {
        self.live == Some(conn)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?next, "Realtime state change");
        self.state = next;
        *self
            .published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    fn connection_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(token) = self.token.as_deref() {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }
        url
    }
}

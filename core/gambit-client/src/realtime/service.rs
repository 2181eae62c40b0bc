//! Event-loop service around [`SyncEngine`].
//!
//! One loop thread owns the engine. Socket readers, timers and the public
//! handle all post onto the same channel, so every state change and every
//! observer call happens on that thread.

use super::engine::{ConnectionState, Input, SyncEngine};
use super::observers::{ObserverId, Observers, Subscription};
use super::socket::WsConnector;
use super::timer::ThreadScheduler;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::token::TokenStore;
use gambit_protocol::{
    ConnectionChange, Mission, RealtimeEvent, RecordDone, RecordStatus, SystemIndicators,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

pub(crate) enum LoopMessage {
    Input(Input),
    Connect,
    Disconnect,
    SetToken(Option<String>),
    Shutdown,
}

/// Handle to the realtime channel. Dropping it stops the loop thread.
pub struct RealtimeClient {
    sender: Sender<LoopMessage>,
    observers: Observers,
    state: Arc<RwLock<ConnectionState>>,
    tokens: Arc<dyn TokenStore>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.state())
            .field("observers", &self.observers)
            .finish()
    }
}

impl RealtimeClient {
    /// Spawns the loop thread. The channel stays idle until [`connect`].
    ///
    /// [`connect`]: RealtimeClient::connect
    pub fn start(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let ws_base = config.ws_base()?;
        let (sender, receiver) = mpsc::channel();
        let observers = Observers::new();

        let engine = SyncEngine::new(
            &ws_base,
            tokens.load(),
            config.reconnect_interval(),
            WsConnector::new(sender.clone(), config.request_timeout()),
            ThreadScheduler::new(sender.clone()),
            observers.clone(),
        );
        let state = engine.state_handle();

        let worker = thread::Builder::new()
            .name("gambit-realtime".to_string())
            .spawn(move || run_loop(engine, receiver))
            .map_err(|err| {
                ClientError::Transport(format!("Failed to spawn realtime loop: {}", err))
            })?;

        tracing::debug!(ws_base = %ws_base, "Realtime service started");
        Ok(Self {
            sender,
            observers,
            state,
            tokens,
            worker: Some(worker),
        })
    }

    pub fn connect(&self) -> Result<()> {
        self.post(LoopMessage::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.post(LoopMessage::Disconnect)
    }

    /// Stores `token` and uses it for the next connection attempt. The live
    /// socket, if any, keeps the token it was opened with.
    pub fn set_token(&self, token: Option<String>) -> Result<()> {
        match token.as_deref() {
            Some(value) => self.tokens.save(value)?,
            None => self.tokens.clear()?,
        }
        self.post(LoopMessage::SetToken(token))
    }

    pub fn state(&self) -> ConnectionState {
        *self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn on<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.observers.on(event, callback)
    }

    pub fn off(&self, event: &str, id: Option<ObserverId>) -> usize {
        self.observers.off(event, id)
    }

    pub fn on_indicators<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SystemIndicators) + Send + Sync + 'static,
    {
        self.observers.on_indicators(callback)
    }

    pub fn on_record_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RecordStatus) + Send + Sync + 'static,
    {
        self.observers.on_record_status(callback)
    }

    pub fn on_mission_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Mission) + Send + Sync + 'static,
    {
        self.observers.on_mission_status(callback)
    }

    pub fn on_record_done<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RecordDone) + Send + Sync + 'static,
    {
        self.observers.on_record_done(callback)
    }

    pub fn on_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionChange) + Send + Sync + 'static,
    {
        self.observers.on_connection(callback)
    }

    /// Disconnects, stops the loop thread and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.sender.send(LoopMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Realtime loop thread panicked");
            }
        }
    }

    fn post(&self, message: LoopMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| ClientError::ServiceStopped)
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut engine: SyncEngine<WsConnector, ThreadScheduler>, receiver: Receiver<LoopMessage>) {
    // The connector and scheduler hold senders, so the channel never
    // disconnects on its own; only Shutdown ends the loop.
    while let Ok(message) = receiver.recv() {
        match message {
            LoopMessage::Input(input) => engine.handle(input),
            LoopMessage::Connect => engine.connect(),
            LoopMessage::Disconnect => engine.disconnect(),
            LoopMessage::SetToken(token) => engine.set_token(token),
            LoopMessage::Shutdown => {
                engine.disconnect();
                break;
            }
        }
    }
    tracing::debug!("Realtime service stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MemoryTokenStore;
    use std::time::{Duration, Instant};

    fn config(ws: &str) -> ClientConfig {
        ClientConfig {
            ws_base_url: ws.to_string(),
            reconnect_interval_ms: 50,
            ..ClientConfig::default()
        }
    }

    #[test]
    fn start_rejects_non_ws_base() {
        let err = RealtimeClient::start(
            &config("http://localhost:8000"),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn set_token_persists_through_store() {
        let store = Arc::new(MemoryTokenStore::new());
        let client = RealtimeClient::start(&config("ws://127.0.0.1:9"), store.clone()).unwrap();

        client.set_token(Some("abc".to_string())).unwrap();
        assert_eq!(store.load().as_deref(), Some("abc"));
        client.set_token(None).unwrap();
        assert_eq!(store.load(), None);
        client.shutdown();
    }

    #[test]
    fn idle_until_connect_then_disconnect_returns_to_idle() {
        let client = RealtimeClient::start(
            &config("ws://127.0.0.1:9"),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap();
        assert_eq!(client.state(), ConnectionState::Idle);

        client.connect().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while client.state() == ConnectionState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_ne!(client.state(), ConnectionState::Idle);

        client.disconnect().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while client.state() != ConnectionState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.is_connected());
    }
}

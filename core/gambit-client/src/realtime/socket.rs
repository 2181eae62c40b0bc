//! WebSocket connector backed by `tungstenite`.
//!
//! Each connection gets one reader thread that owns the socket outright.
//! The thread polls a stop flag between reads (the socket carries a short
//! read timeout), so `close` never has to share the socket across threads.
//! The TCP connect and the upgrade handshake are both bounded by the
//! connector's handshake timeout; a peer that stalls is reported as a
//! failure so the engine can schedule a reconnect.

use super::engine::{ConnectionId, Connector, Input};
use super::service::LoopMessage;
use crate::error::{ClientError, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Error as WsError, Message, WebSocket};
use url::Url;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct WsConnector {
    sink: Sender<LoopMessage>,
    handshake_timeout: Duration,
    readers: HashMap<ConnectionId, ReaderHandle>,
}

impl WsConnector {
    pub(crate) fn new(sink: Sender<LoopMessage>, handshake_timeout: Duration) -> Self {
        Self {
            sink,
            handshake_timeout,
            readers: HashMap::new(),
        }
    }

    fn prune_finished(&mut self) {
        self.readers.retain(|_, reader| !reader.thread.is_finished());
    }
}

impl Connector for WsConnector {
    fn open(&mut self, conn: ConnectionId, url: &Url) -> Result<()> {
        self.prune_finished();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = SocketReader {
            conn,
            url: url.clone(),
            handshake_timeout: self.handshake_timeout,
            stop: Arc::clone(&stop),
            sink: self.sink.clone(),
        };
        let thread = thread::Builder::new()
            .name(format!("gambit-ws-{}", conn))
            .spawn(move || reader.run())
            .map_err(|err| {
                ClientError::Transport(format!("Failed to spawn socket reader: {}", err))
            })?;

        self.readers.insert(conn, ReaderHandle { stop, thread });
        Ok(())
    }

    fn close(&mut self, conn: ConnectionId) {
        if let Some(reader) = self.readers.remove(&conn) {
            reader.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for WsConnector {
    fn drop(&mut self) {
        for reader in self.readers.values() {
            reader.stop.store(true, Ordering::SeqCst);
        }
    }
}

struct SocketReader {
    conn: ConnectionId,
    url: Url,
    handshake_timeout: Duration,
    stop: Arc<AtomicBool>,
    sink: Sender<LoopMessage>,
}

impl SocketReader {
    fn run(self) {
        let mut socket = match self.handshake() {
            Ok(socket) => socket,
            Err(error) => {
                tracing::debug!(conn = self.conn, error = %error, "Realtime handshake failed");
                self.post(Input::Failed {
                    conn: self.conn,
                    error,
                });
                return;
            }
        };

        if self.stop.load(Ordering::SeqCst) {
            let _ = socket.close(None);
            return;
        }

        if !self.post(Input::Opened { conn: self.conn }) {
            let _ = socket.close(None);
            return;
        }

        loop {
            if self.stop.load(Ordering::SeqCst) {
                let _ = socket.close(None);
                let _ = socket.flush();
                tracing::debug!(conn = self.conn, "Socket reader stopped");
                return;
            }

            let delivered = match socket.read() {
                Ok(Message::Text(text)) => self.post(Input::Frame {
                    conn: self.conn,
                    text: text.as_str().to_owned(),
                }),
                Ok(Message::Binary(bytes)) => self.post(Input::Frame {
                    conn: self.conn,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                }),
                Ok(Message::Close(frame)) => {
                    self.post(Input::Closed {
                        conn: self.conn,
                        reason: frame.map(|frame| frame.reason.as_str().to_owned()),
                    });
                    return;
                }
                Ok(_) => true,
                Err(WsError::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    true
                }
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    self.post(Input::Closed {
                        conn: self.conn,
                        reason: None,
                    });
                    return;
                }
                Err(err) => {
                    self.post(Input::Failed {
                        conn: self.conn,
                        error: err.to_string(),
                    });
                    return;
                }
            };

            if !delivered {
                let _ = socket.close(None);
                return;
            }
        }
    }

    /// Connects and upgrades with every blocking step bounded by
    /// `handshake_timeout`, then drops to the short poll interval.
    fn handshake(&self) -> std::result::Result<WebSocket<TcpStream>, String> {
        let stream = open_stream(&self.url, self.handshake_timeout)?;
        stream
            .set_read_timeout(Some(self.handshake_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.handshake_timeout)))
            .map_err(|err| format!("Failed to configure socket: {}", err))?;

        let socket = match tungstenite::client(self.url.as_str(), stream) {
            Ok((socket, _response)) => socket,
            // A read timeout surfaces as WouldBlock, which tungstenite
            // reports as an interrupted handshake.
            Err(HandshakeError::Interrupted(_)) => {
                return Err(format!(
                    "Handshake timed out after {}ms",
                    self.handshake_timeout.as_millis()
                ))
            }
            Err(HandshakeError::Failure(err)) => return Err(err.to_string()),
        };

        socket
            .get_ref()
            .set_read_timeout(Some(READ_POLL_INTERVAL))
            .map_err(|err| format!("Failed to configure socket: {}", err))?;
        Ok(socket)
    }

    /// Returns false once the event loop has gone away.
    fn post(&self, input: Input) -> bool {
        self.sink.send(LoopMessage::Input(input)).is_ok()
    }
}

fn open_stream(url: &Url, timeout: Duration) -> std::result::Result<TcpStream, String> {
    let addrs = url
        .socket_addrs(|| None)
        .map_err(|err| format!("Failed to resolve {}: {}", url, err))?;

    let mut last_error = format!("No addresses for {}", url);
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_error = format!("Failed to connect to {}: {}", addr, err),
        }
    }
    Err(last_error)
}

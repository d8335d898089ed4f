//! Encrypted websocket link to the Plover steno engine.
//!
//! A background thread owns the socket and queues [`TransportEvent`]s; the
//! frame thread drains them with [`PloverTransport::dispatch_pending`], so
//! session state is never touched off the frame thread.

mod config;
mod crypto;
mod message;

pub use config::{PloverServerConfig, Port};
pub use crypto::{generate_keypair, parse_public_key, public_key_hex, Mailbox, NONCE_LEN, TAG_LEN};

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crypto_box::{PublicKey, SecretKey};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::{Message, WebSocket};

use crate::runtime::InputEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// How long a blocked read waits before the stop flag is checked again.
const READ_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no plover config location")]
    NoConfigPath,
    #[error("failed to read plover config {path:?}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },
    #[error("failed to parse plover config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("invalid plover config: {0}")]
    InvalidConfig(String),
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("malformed frame: {0}")]
    Frame(&'static str),
    #[error("failed to encrypt or decrypt message")]
    Crypto,
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Input(InputEvent),
    Connected,
    Disconnected,
}

struct Link {
    mailbox: Mailbox,
    outbound: Sender<String>,
}

struct Inner {
    config_path: Option<PathBuf>,
    secret: SecretKey,
    public: PublicKey,
    connect_lock: Mutex<()>,
    state: Mutex<ConnectionState>,
    stop: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    link: Mutex<Option<Link>>,
    events: Sender<TransportEvent>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PloverTransport {
    inner: Arc<Inner>,
    pending_connect: Mutex<Option<JoinHandle<bool>>>,
    events: Receiver<TransportEvent>,
}

impl PloverTransport {
    /// `config_path` points at `plover_websocket_server_config.json`.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let (secret, public) = generate_keypair();
        let (tx, rx) = mpsc::channel();
        Self {
            inner: Arc::new(Inner {
                config_path,
                secret,
                public,
                connect_lock: Mutex::new(()),
                state: Mutex::new(ConnectionState::Disconnected),
                stop: AtomicBool::new(false),
                reader: Mutex::new(None),
                link: Mutex::new(None),
                events: tx,
            }),
            pending_connect: Mutex::new(None),
            events: rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Blocking handshake. False on missing config or any connection failure.
    pub fn connect(&self) -> bool {
        self.inner.connect()
    }

    /// Run [`connect`](Self::connect) on a worker thread. Ignored while an
    /// earlier attempt is still running.
    pub fn connect_in_background(&self) {
        let mut pending = lock(&self.pending_connect);
        if pending.as_ref().is_some_and(|h| !h.is_finished()) {
            log::trace!("Connection attempt already in flight");
            return;
        }
        let inner = Arc::clone(&self.inner);
        *pending = Some(thread::spawn(move || inner.connect()));
    }

    /// Encrypt and queue a message for the server.
    pub fn send(&self, text: &str) -> Result<(), TransportError> {
        let link = lock(&self.inner.link);
        let link = link.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = link.mailbox.seal(text.as_bytes())?;
        link.outbound
            .send(frame)
            .map_err(|_| TransportError::NotConnected)
    }

    /// Drain queued events in arrival order. Returns how many were handled.
    pub fn dispatch_pending(&self, mut handler: impl FnMut(TransportEvent)) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            handler(event);
            count += 1;
        }
        count
    }

    /// Stop the reader and wait for it. Nothing is dispatched afterwards
    /// until the next connect.
    pub fn close(&self) {
        if let Some(handle) = lock(&self.pending_connect).take() {
            if handle.join().is_err() {
                log::error!("Connection thread panicked");
            }
        }
        self.inner.shutdown();
        while self.events.try_recv().is_ok() {}
    }
}

impl Drop for PloverTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn connect(self: &Arc<Self>) -> bool {
        let _guard = lock(&self.connect_lock);
        if *lock(&self.state) == ConnectionState::Connected {
            return true;
        }
        self.join_reader();

        log::info!("Attempting to connect to plover server");
        *lock(&self.state) = ConnectionState::Connecting;

        match self.open() {
            Ok((socket, mailbox)) => {
                let (out_tx, out_rx) = mpsc::channel();
                *lock(&self.link) = Some(Link {
                    mailbox: mailbox.clone(),
                    outbound: out_tx,
                });
                self.stop.store(false, Ordering::SeqCst);
                *lock(&self.state) = ConnectionState::Connected;
                let _ = self.events.send(TransportEvent::Connected);

                let inner = Arc::clone(self);
                *lock(&self.reader) = Some(thread::spawn(move || {
                    inner.read_loop(socket, mailbox, out_rx)
                }));
                log::info!("Connected to plover");
                true
            }
            Err(e) => {
                log::warn!("Could not connect to plover, using keyboard input: {e}");
                *lock(&self.state) = ConnectionState::Disconnected;
                false
            }
        }
    }

    fn open(&self) -> Result<(WebSocket<TcpStream>, Mailbox), TransportError> {
        let path = self.config_path.as_ref().ok_or(TransportError::NoConfigPath)?;
        let config = PloverServerConfig::load(path)?;
        let port = config.port()?;
        let server_key = parse_public_key(&config.public_key)?;
        let mailbox = Mailbox::new(&self.secret, &server_key);

        let handshake = mailbox.seal(b"{}")?;
        let url = format!(
            "ws://{}:{}/websocket?publicKey={}&encryptedMessage={}",
            config.host,
            port,
            public_key_hex(&self.public),
            utf8_percent_encode(&handshake, NON_ALPHANUMERIC)
        );
        log::info!("Connecting to ws://{}:{port}/websocket", config.host);

        let mut request = url.into_client_request()?;
        let origin = HeaderValue::from_str(&config.host)
            .map_err(|e| TransportError::InvalidConfig(format!("host: {e}")))?;
        request.headers_mut().insert("Origin", origin);

        let addr = (config.host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::InvalidConfig(format!("cannot resolve {}", config.host)))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;

        let (socket, _response) =
            tungstenite::client(request, stream).map_err(|e| TransportError::Handshake(e.to_string()))?;
        socket.get_ref().set_read_timeout(Some(READ_POLL))?;
        Ok((socket, mailbox))
    }

    fn read_loop(&self, mut socket: WebSocket<TcpStream>, mailbox: Mailbox, outbound: Receiver<String>) {
        'read: while !self.stop.load(Ordering::SeqCst) {
            while let Ok(frame) = outbound.try_recv() {
                if let Err(e) = socket.send(Message::text(frame)) {
                    log::error!("Failed to send to plover: {e}");
                    break 'read;
                }
            }

            match socket.read() {
                Ok(Message::Text(text)) => self.receive(&mailbox, text.as_bytes()),
                Ok(Message::Binary(bytes)) => self.receive(&mailbox, &bytes),
                Ok(Message::Close(_)) => {
                    log::info!("Server requested close");
                    let _ = socket.flush();
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    // Idle; push out any queued pong.
                    if let Err(e) = socket.flush() {
                        log::error!("Plover connection failed: {e}");
                        break;
                    }
                }
                Err(e) => {
                    log::error!("Plover connection failed: {e}");
                    break;
                }
            }
        }

        if self.stop.load(Ordering::SeqCst) {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        *lock(&self.link) = None;
        *lock(&self.state) = ConnectionState::Disconnected;
        let _ = self.events.send(TransportEvent::Disconnected);
        log::info!("Disconnected from plover");
    }

    fn receive(&self, mailbox: &Mailbox, frame: &[u8]) {
        let plain = match mailbox.open(frame) {
            Ok(plain) => plain,
            Err(e) => {
                log::error!("Failed to decrypt message: {e}");
                return;
            }
        };
        let text = String::from_utf8_lossy(&plain);
        log::trace!("Plover: {text}");
        if let Some(event) = message::parse(&text) {
            let _ = self.events.send(TransportEvent::Input(event));
        }
    }

    fn join_reader(&self) {
        if let Some(handle) = lock(&self.reader).take() {
            if handle.join().is_err() {
                log::error!("Plover reader thread panicked");
            }
        }
    }

    fn shutdown(&self) {
        let _guard = lock(&self.connect_lock);
        self.stop.store(true, Ordering::SeqCst);
        self.join_reader();
        *lock(&self.state) = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn connect_without_config_fails() {
        let transport = PloverTransport::new(None);
        assert!(!transport.connect());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_with_missing_file_fails() {
        let dir = tempdir().unwrap();
        let transport = PloverTransport::new(Some(dir.path().join("missing.json")));
        assert!(!transport.connect());
        assert_eq!(transport.dispatch_pending(|_| {}), 0);
    }

    #[test]
    fn connect_refused_fails() {
        let dir = tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (_, server_public) = generate_keypair();
        let path = dir.path().join("plover.json");
        fs::write(
            &path,
            format!(
                r#"{{"host": "127.0.0.1", "port": "{port}", "public_key": "{}"}}"#,
                public_key_hex(&server_public)
            ),
        )
        .unwrap();

        let transport = PloverTransport::new(Some(path));
        assert!(!transport.connect());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_is_idempotent() {
        let transport = PloverTransport::new(None);
        transport.close();
        transport.close();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn background_connect_then_close() {
        let transport = PloverTransport::new(None);
        transport.connect_in_background();
        transport.connect_in_background();
        transport.close();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn send_requires_connection() {
        let transport = PloverTransport::new(None);
        assert!(matches!(transport.send("{}"), Err(TransportError::NotConnected)));
    }
}

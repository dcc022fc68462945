//! Single relay connection: WebSocket transport, state machine, and the
//! status/frame stream consumed by the owning pool.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::messages::{ClientMessage, RelayMessage};

/// Read/write capability flags for a registered relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCapabilities {
    pub read: bool,
    pub write: bool,
}

impl RelayCapabilities {
    pub fn read_write() -> Self {
        RelayCapabilities {
            read: true,
            write: true,
        }
    }
}

/// Transport status signals emitted by a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    Connected,
    Disconnected,
    /// The local side requested the close.
    Cancelled,
    /// Advisory from the transport: `true` means an automatic retry is
    /// appropriate. The connection itself never retries; that is the
    /// owner's decision.
    ReconnectSuggested(bool),
}

/// One inbound occurrence from a relay: a transport status change or a
/// parsed protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Status(RelayStatus),
    Frame(RelayMessage),
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Cancelled,
}

/// Pacing delay before a failed connection attempt reports `Disconnected`,
/// so owner-driven retry cannot spin against a dead endpoint.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>>;

/// One transport connection to a single relay endpoint. The relay URL doubles
/// as its identifier in the pool's fan-in stream.
pub struct RelayConnection {
    url: String,
    capabilities: RelayCapabilities,
    tor_socks: Option<String>,
    state: Arc<Mutex<ConnState>>,
    outbound: OutboundSlot,
    events: mpsc::UnboundedSender<(String, RelayEvent)>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RelayConnection {
    pub fn new(
        url: String,
        capabilities: RelayCapabilities,
        tor_socks: Option<String>,
        events: mpsc::UnboundedSender<(String, RelayEvent)>,
    ) -> Self {
        RelayConnection {
            url,
            capabilities,
            tor_socks,
            state: Arc::new(Mutex::new(ConnState::Disconnected)),
            outbound: Arc::new(Mutex::new(None)),
            events,
            task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn capabilities(&self) -> RelayCapabilities {
        self.capabilities
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock().unwrap()
    }

    /// Start the transport handshake in the background. Idempotent: a no-op
    /// while already connecting or connected. The caller observes progress
    /// through the event stream, never by blocking here.
    pub fn connect(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, ConnState::Connecting | ConnState::Connected) {
                return;
            }
            *state = ConnState::Connecting;
        }
        let handle = tokio::spawn(run_connection(
            self.url.clone(),
            self.tor_socks.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.outbound),
            self.events.clone(),
        ));
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Queue a message for transmission. Dropped silently while not
    /// connected; callers must not assume delivery before observing
    /// `Connected` on the event stream.
    pub fn send(&self, msg: &ClientMessage) {
        match self.outbound.lock().unwrap().as_ref() {
            Some(tx) => {
                let _ = tx.send(msg.clone());
            }
            None => debug!(relay = %self.url, "dropping message while not connected"),
        }
    }

    /// Request a graceful close. The transport drains queued messages and
    /// then reports `Cancelled`.
    pub fn disconnect(&self) {
        self.outbound.lock().unwrap().take();
    }

    /// Abort the transport task immediately without emitting any further
    /// events. Used by pool teardown.
    pub fn abort(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
        self.outbound.lock().unwrap().take();
        *self.state.lock().unwrap() = ConnState::Cancelled;
    }
}

/// Transport task: connect, then pump outbound messages and inbound frames
/// until the connection ends, reporting the terminal status to the owner.
async fn run_connection(
    url: String,
    tor_socks: Option<String>,
    state: Arc<Mutex<ConnState>>,
    outbound: OutboundSlot,
    events: mpsc::UnboundedSender<(String, RelayEvent)>,
) {
    let mut ws = match connect_ws(&url, tor_socks.as_deref()).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(relay = %url, error = %e, "connection attempt failed");
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            *state.lock().unwrap() = ConnState::Disconnected;
            let _ = events.send((url, RelayEvent::Status(RelayStatus::Disconnected)));
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    *outbound.lock().unwrap() = Some(tx);
    *state.lock().unwrap() = ConnState::Connected;
    debug!(relay = %url, "connected");
    let _ = events.send((url.clone(), RelayEvent::Status(RelayStatus::Connected)));

    let status = loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = ws.send(Message::Text(msg.to_json())).await {
                        warn!(relay = %url, error = %e, "send failed");
                        break RelayStatus::ReconnectSuggested(true);
                    }
                }
                // The outbound sender was taken: local close requested.
                None => {
                    let _ = ws.close(None).await;
                    break RelayStatus::Cancelled;
                }
            },
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(txt))) => {
                    if let Some(msg) = RelayMessage::from_json(&txt) {
                        let _ = events.send((url.clone(), RelayEvent::Frame(msg)));
                    }
                }
                Some(Ok(Message::Close(_))) | None => break RelayStatus::Disconnected,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(relay = %url, error = %e, "transport error");
                    break RelayStatus::ReconnectSuggested(true);
                }
            },
        }
    };

    outbound.lock().unwrap().take();
    *state.lock().unwrap() = match status {
        RelayStatus::Cancelled => ConnState::Cancelled,
        _ => ConnState::Disconnected,
    };
    debug!(relay = %url, ?status, "connection ended");
    let _ = events.send((url, RelayEvent::Status(status)));
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
async fn connect_ws(
    relay: &str,
    tor_socks: Option<&str>,
) -> Result<WebSocketStream<Box<dyn AsyncReadWrite + Unpin + Send>>> {
    let url = Url::parse(relay)?;
    let host = url.host_str().ok_or_else(|| anyhow!("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("missing port"))?;
    let req = relay.into_client_request()?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = tor_socks {
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(TcpStream::connect((host, port)).await?)
    };
    let (ws, _) = client_async(req, stream).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

//! Server network layer handling websocket connections and the turn watchdog

use crate::config::ServerConfig;
use crate::service::GameService;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Frames that may wait in a connection's outbound queue.
const OUTBOX_CAPACITY: usize = 64;
const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);
/// How long a closing connection may spend flushing queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Who a connection claims to be, read from the handshake query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub identity: String,
    pub name: String,
}

/// The query parameters a client may put on the websocket URL.
#[derive(Debug, Default, Deserialize)]
struct HandshakeQuery {
    player: Option<String>,
    name: Option<String>,
}

impl Handshake {
    /// Parses `player=<id>&name=<display name>`. Without a player the peer
    /// address stands in, and the identity doubles as the name. Unknown
    /// parameters are ignored; a query that cannot be decoded counts as empty.
    pub fn from_query(query: Option<&str>, addr: SocketAddr) -> Self {
        let query = match query {
            Some(raw) => serde_urlencoded::from_str(raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed handshake query from {}: {}", addr, e);
                HandshakeQuery::default()
            }),
            None => HandshakeQuery::default(),
        };

        let identity = query
            .player
            .filter(|player| !player.is_empty())
            .unwrap_or_else(|| addr.to_string());
        let name = query
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| identity.clone());
        Self { identity, name }
    }
}

/// Websocket front end for the game service
pub struct Server {
    listener: TcpListener,
    service: Arc<GameService>,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, BoxError> {
        let service = Arc::new(GameService::new(&config.game, config.max_connections));
        Self::with_service(config, service).await
    }

    /// Binds with a prebuilt service, e.g. one carrying a terminal check.
    pub async fn with_service(config: ServerConfig, service: Arc<GameService>) -> Result<Self, BoxError> {
        config.game.validate()?;
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            service,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> Arc<GameService> {
        Arc::clone(&self.service)
    }

    /// Spawns task that expires stalled turns and evicts idle connections
    fn spawn_watchdog(&self) {
        let service = Arc::clone(&self.service);
        let turn_timeout = self.config.turn_timeout;
        let idle_timeout = self.config.idle_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCHDOG_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let expired = service.expire_stalled_turns(turn_timeout).await;
                if expired > 0 {
                    debug!("Watchdog expired {} stalled turns", expired);
                }

                let evicted = service.evict_idle(idle_timeout).await;
                for connection in evicted {
                    info!(
                        "Evicted idle connection {} ({}) from {}",
                        connection.id, connection.identity, connection.addr
                    );
                }
            }
        });
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self) -> Result<(), BoxError> {
        self.spawn_watchdog();
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(service, stream, addr).await {
                            warn!("Connection from {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    service: Arc<GameService>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), BoxError> {
    let mut handshake = None;
    let socket = accept_hdr_async(stream, |request: &Request, response: Response| {
        handshake = Some(Handshake::from_query(request.uri().query(), addr));
        Ok::<Response, ErrorResponse>(response)
    })
    .await?;
    let Handshake { identity, name } =
        handshake.unwrap_or_else(|| Handshake::from_query(None, addr));

    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbound) = mpsc::channel::<Message>(OUTBOX_CAPACITY);

    let connection_id = match service.connect(&identity, &name, addr, outbox.clone()).await {
        Ok(id) => id,
        Err(refusal) => {
            info!("Refused {} from {}: {}", identity, addr, refusal);
            let text = refusal.to_event().encode()?;
            sink.send(Message::Text(text)).await?;
            sink.send(Message::Close(None)).await?;
            return Ok(());
        }
    };

    // The writer stops after a close frame, which is how an eviction ends
    // this connection even when the peer never answers.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            let sent = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sink.send(message)).await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write failed: {}", e);
                    break;
                }
                Err(_) => {
                    debug!("Write timed out");
                    break;
                }
            }
            if closing {
                break;
            }
        }
        let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sink.close()).await;
    });
    let mut writer_done = false;

    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = &mut writer => {
                debug!("Writer for {} finished, closing reader", identity);
                writer_done = true;
                break;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => service.handle_text(&identity, &name, &text).await,
            Some(Ok(Message::Binary(_))) => service.handle_binary(&identity).await,
            // Tungstenite answers pings itself; both still count as activity
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                service.touch(&identity).await
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                warn!("Read error from {}: {}", identity, e);
                break;
            }
        }
    }

    service.disconnect(&identity, connection_id).await;
    drop(outbox);
    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("Writer for {} did not drain in time", identity);
        writer.abort();
    }

    Ok(())
}

//! Live websocket connection tracking for the game server
//!
//! This module keeps the server-side roster of connected players:
//! - Connection lifecycle (connect, disconnect, idle eviction)
//! - Outbound channel lookup so events can be pushed to a player
//! - Capacity enforcement and duplicate identity refusal
//!
//! Identities come from the handshake and are the same strings used as
//! player ids inside matches.

use log::info;
use shared::ServerEvent;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Frames queued for a connection's writer task.
pub type Outbox = mpsc::Sender<Message>;

/// One connected player
#[derive(Debug)]
pub struct Connection {
    /// Server-assigned id, unique for the lifetime of the process
    pub id: u32,
    /// Player identity from the handshake
    pub identity: String,
    pub name: String,
    pub addr: SocketAddr,
    /// Last time an inbound frame arrived
    pub last_seen: Instant,
    pub outbox: Outbox,
}

impl Connection {
    pub fn new(id: u32, identity: String, name: String, addr: SocketAddr, outbox: Outbox) -> Self {
        Self {
            id,
            identity,
            name,
            addr,
            last_seen: Instant::now(),
            outbox,
        }
    }

    /// Returns true if nothing has been received within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    ServerFull,
    AlreadyConnected,
}

impl Refusal {
    /// The `error` event sent before the socket is closed.
    pub fn to_event(&self) -> ServerEvent {
        match self {
            Refusal::ServerFull => ServerEvent::error("ServerFull", 503, self.to_string()),
            Refusal::AlreadyConnected => {
                ServerEvent::error("AlreadyConnected", 409, self.to_string())
            }
        }
    }
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::ServerFull => write!(f, "server full"),
            Refusal::AlreadyConnected => write!(f, "identity already connected"),
        }
    }
}

/// Roster of connected players indexed by identity
///
/// Enforces the server-wide connection cap and refuses a second live
/// connection for an identity that is already connected.
pub struct ConnectionManager {
    connections: HashMap<String, Connection>,
    next_connection_id: u32,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a connection and returns its id.
    pub fn add_connection(
        &mut self,
        identity: &str,
        name: &str,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Result<u32, Refusal> {
        if self.connections.contains_key(identity) {
            return Err(Refusal::AlreadyConnected);
        }
        if self.connections.len() >= self.max_connections {
            return Err(Refusal::ServerFull);
        }

        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;

        let connection = Connection::new(
            connection_id,
            identity.to_string(),
            name.to_string(),
            addr,
            outbox,
        );
        info!(
            "Connection {} for {} ({}) from {}",
            connection_id, identity, name, addr
        );
        self.connections.insert(identity.to_string(), connection);

        Ok(connection_id)
    }

    /// Removes the connection for `identity` if it is still the one with
    /// `connection_id`. An evicted connection's late cleanup must not tear
    /// down a newer connection that reused the identity.
    pub fn remove_connection(&mut self, identity: &str, connection_id: u32) -> bool {
        let current = self
            .connections
            .get(identity)
            .is_some_and(|connection| connection.id == connection_id);
        if !current {
            return false;
        }

        if let Some(connection) = self.connections.remove(identity) {
            info!("Connection {} for {} closed", connection.id, identity);
        }
        true
    }

    /// Marks inbound activity for `identity`.
    pub fn touch(&mut self, identity: &str) {
        if let Some(connection) = self.connections.get_mut(identity) {
            connection.last_seen = Instant::now();
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.connections.contains_key(identity)
    }

    pub fn outbox(&self, identity: &str) -> Option<Outbox> {
        self.connections
            .get(identity)
            .map(|connection| connection.outbox.clone())
    }

    /// Removes and returns every connection idle for longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Connection> {
        let timed_out: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_timed_out(timeout))
            .map(|(identity, _)| identity.clone())
            .collect();

        timed_out
            .into_iter()
            .filter_map(|identity| {
                let connection = self.connections.remove(&identity)?;
                info!("Connection {} for {} timed out", connection.id, identity);
                Some(connection)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

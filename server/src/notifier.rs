//! Pushes server events to connected players.

use crate::connections::{ConnectionManager, Outbox};
use log::{debug, error, warn};
use shared::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

#[derive(Clone)]
pub struct Notifier {
    connections: Arc<RwLock<ConnectionManager>>,
}

impl Notifier {
    pub fn new(connections: Arc<RwLock<ConnectionManager>>) -> Self {
        Self { connections }
    }

    /// Sends `event` to one player. Returns false if the player is not
    /// connected or their queue could not take the frame.
    pub async fn send_to(&self, identity: &str, event: &ServerEvent) -> bool {
        let Some(text) = encode(event) else {
            return false;
        };
        let outbox = self.connections.read().await.outbox(identity);

        match outbox {
            Some(outbox) => deliver(identity, &outbox, text),
            None => {
                debug!("Dropping event for disconnected player {}", identity);
                false
            }
        }
    }

    /// Sends `event` to every listed player that is connected.
    pub async fn broadcast(&self, identities: &[String], event: &ServerEvent) {
        let Some(text) = encode(event) else {
            return;
        };

        // Collect outboxes first so the roster lock is not held while sending
        let outboxes: Vec<_> = {
            let connections = self.connections.read().await;
            identities
                .iter()
                .filter_map(|identity| Some((identity, connections.outbox(identity)?)))
                .collect()
        };

        for (identity, outbox) in outboxes {
            deliver(identity, &outbox, text.clone());
        }
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            None
        }
    }
}

fn deliver(identity: &str, outbox: &Outbox, text: String) -> bool {
    match outbox.try_send(Message::Text(text)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Outbound queue for {} is full, dropping event", identity);
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Outbound queue for {} is closed", identity);
            false
        }
    }
}

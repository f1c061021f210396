//! Order announcement transport seam
//!
//! Routing and peer discovery are an external concern; the coordinator only
//! needs publish/subscribe/send semantics. [`LocalTransport`] is the
//! in-process loopback used for tests and single-node deployments.

use crate::error::Result;
use crate::order::{Order, OrderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransportPayload {
    /// A new order looking for a counterparty.
    OrderAnnouncement(Order),
    /// Progress of a known order.
    OrderUpdate(Order),
    /// Unsigned transaction handed to the counterparty for completion.
    PartialTransaction { order_id: OrderId, raw: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMessage {
    pub id: Uuid,
    /// Peer the message is addressed to; `None` broadcasts.
    pub to: Option<String>,
    pub payload: TransportPayload,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, payload: TransportPayload) -> Result<()>;

    async fn send(&self, peer: &str, payload: TransportPayload) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<TransportMessage>;
}

/// Loopback transport delivering every message to all local subscribers.
pub struct LocalTransport {
    tx: broadcast::Sender<TransportMessage>,
}

impl LocalTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    fn deliver(&self, to: Option<String>, payload: TransportPayload) {
        let message = TransportMessage {
            id: Uuid::new_v4(),
            to,
            payload,
        };
        // no subscribers is not an error for a loopback
        if self.tx.send(message).is_err() {
            debug!("transport message dropped: no subscribers");
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn publish(&self, payload: TransportPayload) -> Result<()> {
        self.deliver(None, payload);
        Ok(())
    }

    async fn send(&self, peer: &str, payload: TransportPayload) -> Result<()> {
        self.deliver(Some(peer.to_string()), payload);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
        self.tx.subscribe()
    }
}

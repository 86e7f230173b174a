use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use tablesplit::{
    websockets::{OutboundEvent, SocketError, SocketWrapper},
    PosClient, PosError,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Server half of an in-process socket
struct ChannelSocket {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl SocketWrapper for ChannelSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.to_client
            .send(message)
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        Ok(self.from_client.recv().await)
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        Ok(())
    }
}

/// Client half of an in-process socket
///
/// Dropping it (or calling `disconnect`) ends the server's connection loop.
pub struct ClientSocket {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl ClientSocket {
    /// Creates a connected pair; the boxed half goes to the server
    pub fn pair() -> (Self, Box<dyn SocketWrapper>) {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let client = Self {
            outgoing: Some(client_tx),
            incoming: client_rx,
        };
        let server = ChannelSocket {
            from_client: server_rx,
            to_client: server_tx,
        };
        (client, Box::new(server))
    }

    pub fn send(&self, frame: &str) {
        if let Some(outgoing) = &self.outgoing {
            outgoing.send(frame.to_string()).unwrap();
        }
    }

    pub fn disconnect(&mut self) {
        self.outgoing = None;
    }

    /// Next event pushed by the server, or None if nothing arrives in time
    pub async fn next_event(&mut self) -> Option<OutboundEvent> {
        match tokio::time::timeout(Duration::from_millis(500), self.incoming.recv()).await {
            Ok(Some(raw)) => Some(serde_json::from_str(&raw).unwrap()),
            _ => None,
        }
    }

    /// Every event already delivered, without waiting
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(raw) = self.incoming.try_recv() {
            events.push(serde_json::from_str(&raw).unwrap());
        }
        events
    }
}

/// POS client that fails the first `failures` calls, then succeeds
pub struct FlakyPosClient {
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl FlakyPosClient {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PosClient for FlakyPosClient {
    async fn mark_items_paid(
        &self,
        restaurant_id: &str,
        _external_sale_id: &str,
        _item_ids: &[String],
    ) -> Result<(), PosError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(PosError::NotConnected(restaurant_id.to_string()))
        } else {
            Ok(())
        }
    }
}

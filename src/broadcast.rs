//! Push notifications to online users, outside the request/reply cycle.
//!
//! Each connection registers an outbound channel drained by its own task, which
//! is also the only writer of replies on that socket. A push therefore never
//! interleaves with a reply, and carries the `EVT|` frame header so the client
//! can tell it apart. Delivery is at-most-once: offline users miss the event
//! and learn the true state from `BEGIN_EXAM` / `RESUME_EXAM` later.

use crate::error::RoomError;
use crate::metrics::Metrics;
use crate::protocol::Event;
use crate::types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Identifies one accepted connection
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
struct Online {
    conn_id: ConnectionId,
    tx: mpsc::UnboundedSender<Event>,
}

#[derive(Debug)]
pub struct Broadcaster {
    online: RwLock<HashMap<UserId, Online>>,
    next_conn_id: AtomicU64,
    metrics: Arc<Metrics>,
}

impl Broadcaster {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            online: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            metrics,
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Mark `user_id` online. A user holds at most one connection.
    pub async fn register(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Result<(), RoomError> {
        let mut online = self.online.write().await;
        if let Some(existing) = online.get(user_id) {
            // A dead entry can linger until its task notices the disconnect
            if existing.conn_id != conn_id && !existing.tx.is_closed() {
                return Err(RoomError::Conflict(format!(
                    "user {} is already logged in",
                    user_id
                )));
            }
        }
        online.insert(user_id.to_string(), Online { conn_id, tx });
        tracing::debug!("User {} online on connection {}", user_id, conn_id);
        Ok(())
    }

    /// Release the user's slot, but only if it still belongs to `conn_id`
    pub async fn unregister(&self, user_id: &str, conn_id: ConnectionId) {
        let mut online = self.online.write().await;
        if online.get(user_id).is_some_and(|o| o.conn_id == conn_id) {
            online.remove(user_id);
            tracing::debug!("User {} offline (connection {})", user_id, conn_id);
        }
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.online.read().await.contains_key(user_id)
    }

    /// Push `event` to every online user in `users`; returns how many got it
    pub async fn push<'a>(&self, users: impl IntoIterator<Item = &'a UserId>, event: &Event) -> usize {
        let online = self.online.read().await;
        let mut delivered = 0;
        for user in users {
            let Some(entry) = online.get(user) else {
                continue;
            };
            if entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
                Metrics::incr(&self.metrics.pushes_sent);
            } else {
                Metrics::incr(&self.metrics.pushes_dropped);
                tracing::debug!("Dropped {} for {}: connection closing", event, user);
            }
        }
        tracing::info!("Pushed {} to {} online user(s)", event, delivered);
        delivered
    }
}

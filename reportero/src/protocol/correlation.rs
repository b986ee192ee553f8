// Correlation Table: in-flight requests awaiting their reply
//
// Insert, resolve and remove all happen under one lock, and a resolution is
// handed to the waiter before that lock is released. A waiter that times out
// and finds its entry already gone therefore always finds the reply waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

use super::message::Envelope;
use crate::error::ProtocolError;

struct PendingRequest {
    reply: oneshot::Sender<Envelope>,
    started_at: Instant,
}

#[derive(Clone, Default)]
pub struct CorrelationTable {
    entries: Arc<Mutex<HashMap<String, PendingRequest>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a slot for `message_id`. The returned handle owns the slot: it is
    /// removed when the handle resolves, times out or is dropped.
    pub fn register(&self, message_id: &str) -> Result<PendingReply, ProtocolError> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.lock();
        if entries.contains_key(message_id) {
            return Err(ProtocolError::DuplicateRequest(message_id.to_string()));
        }
        entries.insert(
            message_id.to_string(),
            PendingRequest {
                reply: tx,
                started_at: Instant::now(),
            },
        );

        Ok(PendingReply {
            message_id: message_id.to_string(),
            table: self.clone(),
            rx,
        })
    }

    /// Hand `reply` to the request named by its `in_reply_to`. The envelope is
    /// given back when no live entry matches.
    pub fn resolve(&self, reply: Envelope) -> Result<(), Envelope> {
        let Some(request_id) = reply.in_reply_to().map(str::to_string) else {
            return Err(reply);
        };

        let mut entries = self.lock();
        let Some(pending) = entries.remove(&request_id) else {
            return Err(reply);
        };

        debug!(
            "Resolved request {} after {:?}",
            request_id,
            pending.started_at.elapsed()
        );
        // Waiter may already be gone.
        let _ = pending.reply.send(reply);
        Ok(())
    }

    pub fn remove(&self, message_id: &str) -> bool {
        self.lock().remove(message_id).is_some()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.lock().contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.len())
            .finish()
    }
}

/// The waiting side of a correlation slot.
pub struct PendingReply {
    message_id: String,
    table: CorrelationTable,
    rx: oneshot::Receiver<Envelope>,
}

impl PendingReply {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Wait for the reply. `None` means the wait expired; exactly one of the
    /// two outcomes is ever observed.
    pub async fn wait(mut self, timeout: Duration) -> Option<Envelope> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(_)) => None,
            Err(_) => {
                if self.table.remove(&self.message_id) {
                    None
                } else {
                    // Resolved at the deadline: the reply is already queued.
                    self.rx.try_recv().ok()
                }
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.remove(&self.message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{response_payload, MessageKind};
    use serde_json::json;

    fn reply_to(id: &str) -> Envelope {
        Envelope::build(
            MessageKind::Response,
            "peer",
            Some("me".into()),
            response_payload(json!("ok")),
            Some(id.to_string()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_exactly_once() {
        let table = CorrelationTable::new();
        let pending = table.register("req-1").unwrap();
        assert!(table.contains("req-1"));

        assert!(table.resolve(reply_to("req-1")).is_ok());
        assert!(table.resolve(reply_to("req-1")).is_err());
        assert!(table.is_empty());

        let reply = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.in_reply_to(), Some("req-1"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = CorrelationTable::new();
        let _first = table.register("req-1").unwrap();
        assert!(matches!(
            table.register("req-1"),
            Err(ProtocolError::DuplicateRequest(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unmatched_reply_is_handed_back() {
        let table = CorrelationTable::new();
        let _pending = table.register("req-1").unwrap();
        let stray = table.resolve(reply_to("other")).unwrap_err();
        assert_eq!(stray.in_reply_to(), Some("other"));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn timeout_removes_entry() {
        let table = CorrelationTable::new();
        let pending = table.register("req-1").unwrap();
        assert!(pending.wait(Duration::from_millis(20)).await.is_none());
        assert!(table.is_empty());
        assert!(table.resolve(reply_to("req-1")).is_err());
    }

    #[test]
    fn dropping_the_waiter_frees_the_slot() {
        let table = CorrelationTable::new();
        let pending = table.register("req-1").unwrap();
        drop(pending);
        assert!(table.is_empty());
    }
}

//! Live message delivery for one conversation on top of the table change feed.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{ChangeKind, ChangeStream};
use crate::models::Message;

/// How many delivered message ids are remembered for de-duplication.
pub const SEEN_CAPACITY: usize = 512;

struct SeenIds {
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// False when `id` was already there.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

/// Delivers newly inserted messages of one conversation to a callback, each
/// id at most once. Events arrive in backend order; there is no gap detection.
/// Dropping the feed stops delivery.
pub struct ConversationFeed {
    conversation_id: Uuid,
    seen: Arc<Mutex<SeenIds>>,
    task: JoinHandle<()>,
}

impl ConversationFeed {
    pub fn start<F>(conversation_id: Uuid, mut stream: ChangeStream, mut on_message: F) -> Self
    where
        F: FnMut(Message) + Send + 'static,
    {
        let seen = Arc::new(Mutex::new(SeenIds::new(SEEN_CAPACITY)));
        let task_seen = seen.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                if event.kind != ChangeKind::Insert {
                    continue;
                }
                let message: Message = match serde_json::from_value(event.record) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("Skipping undecodable message event: {}", e);
                        continue;
                    }
                };
                if message.conversation_id != conversation_id {
                    continue;
                }
                if !task_seen.lock().insert(message.id) {
                    tracing::debug!("Duplicate message {} dropped", message.id);
                    continue;
                }
                on_message(message);
            }
            tracing::debug!("Change feed for conversation {} closed", conversation_id);
        });
        Self {
            conversation_id,
            seen,
            task,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Skip a message already shown locally, e.g. one this client just sent.
    pub fn mark_seen(&self, message_id: Uuid) {
        self.seen.lock().insert(message_id);
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        // Drop aborts.
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use super::base::{ServiceResult, decode_all, first, row, run};
use crate::backend::{Filter, Select, TableClient};
use crate::error::BackendError;
use crate::models::{Conversation, Message, MessageRead, NewMessage};
use crate::realtime::ConversationFeed;

pub(crate) const CONVERSATIONS: &str = "conversations";
pub(crate) const MESSAGES: &str = "messages";
pub(crate) const MESSAGE_READS: &str = "message_reads";

pub const MAX_PAGE: u64 = 200;

#[derive(Clone)]
pub struct MessageService {
    db: Arc<dyn TableClient>,
}

impl MessageService {
    pub fn new(db: Arc<dyn TableClient>) -> Self {
        Self { db }
    }

    /// Conversations `user_id` takes part in, most recently active first.
    pub async fn list_conversations(&self, user_id: Uuid) -> ServiceResult<Vec<Conversation>> {
        run("messages.list_conversations", async {
            let rows = self
                .db
                .select(
                    Select::from(CONVERSATIONS)
                        .contains("participant_ids", [user_id])
                        .order("last_message_at", false)
                        .order("created_at", false),
                )
                .await?;
            decode_all(rows.rows)
        })
        .await
    }

    pub async fn get_conversation(&self, conversation_id: Uuid) -> ServiceResult<Conversation> {
        run("messages.get_conversation", async {
            let rows = self
                .db
                .select(Select::from(CONVERSATIONS).eq("id", conversation_id))
                .await?;
            first(rows.rows, "conversation")
        })
        .await
    }

    /// The one-to-one conversation between two users, created on first use.
    pub async fn get_or_create_direct(&self, user_id: Uuid, other_id: Uuid) -> ServiceResult<Conversation> {
        run("messages.get_or_create_direct", async {
            if user_id == other_id {
                return Err(BackendError::validation("cannot start a conversation with yourself"));
            }
            let rows = self
                .db
                .select(
                    Select::from(CONVERSATIONS)
                        .eq("is_group", false)
                        .contains("participant_ids", [user_id, other_id]),
                )
                .await?;
            let existing = decode_all::<Conversation>(rows.rows)?
                .into_iter()
                .find(|c| c.participant_ids.len() == 2);
            if let Some(conversation) = existing {
                return Ok(conversation);
            }
            let written = self
                .db
                .insert(
                    CONVERSATIONS,
                    vec![json!({ "participant_ids": [user_id, other_id], "is_group": false })],
                )
                .await?;
            first(written, "conversation")
        })
        .await
    }

    pub async fn create_group_conversation(
        &self,
        title: &str,
        participant_ids: &[Uuid],
        lodge_id: Option<Uuid>,
    ) -> ServiceResult<Conversation> {
        run("messages.create_group_conversation", async {
            if title.trim().is_empty() {
                return Err(BackendError::validation("group conversations need a title"));
            }
            let mut participants = participant_ids.to_vec();
            participants.sort_unstable();
            participants.dedup();
            if participants.len() < 2 {
                return Err(BackendError::validation("a conversation needs two participants"));
            }
            let written = self
                .db
                .insert(
                    CONVERSATIONS,
                    vec![json!({
                        "title": title.trim(),
                        "participant_ids": participants,
                        "is_group": true,
                        "lodge_id": lodge_id,
                    })],
                )
                .await?;
            first(written, "conversation")
        })
        .await
    }

    /// Appends the message, then bumps the conversation's `last_message_at`.
    /// A failed bump is logged; the message stays sent.
    pub async fn send_message(&self, message: &NewMessage) -> ServiceResult<Message> {
        run("messages.send_message", async {
            if message.text.trim().is_empty() && message.attachments.is_empty() {
                return Err(BackendError::validation("message is empty"));
            }
            let written = self.db.insert(MESSAGES, vec![row(message)?]).await?;
            let sent: Message = first(written, "message")?;

            let at = sent.created_at.unwrap_or_else(Utc::now);
            if let Err(e) = self
                .db
                .update(
                    CONVERSATIONS,
                    vec![Filter::Eq("id".into(), sent.conversation_id.to_string().into())],
                    json!({ "last_message_at": at }),
                )
                .await
            {
                tracing::warn!(
                    "Message {} sent but conversation {} not bumped: {}",
                    sent.id,
                    sent.conversation_id,
                    e
                );
            }
            Ok(sent)
        })
        .await
    }

    /// Up to `limit` messages older than `before` (newest when absent),
    /// returned oldest first.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: u64,
    ) -> ServiceResult<Vec<Message>> {
        run("messages.list_messages", async {
            let mut select = Select::from(MESSAGES).eq("conversation_id", conversation_id);
            if let Some(before) = before {
                select = select.lt("created_at", before);
            }
            let rows = self
                .db
                .select(
                    select
                        .order("created_at", false)
                        .limit(limit.clamp(1, MAX_PAGE)),
                )
                .await?;
            let mut messages: Vec<Message> = decode_all(rows.rows)?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    /// Read receipts, one per (message, user); repeating a call only moves `read_at`.
    pub async fn mark_read(&self, message_ids: &[Uuid], user_id: Uuid) -> ServiceResult<Vec<MessageRead>> {
        run("messages.mark_read", async {
            let mut ids = message_ids.to_vec();
            ids.sort_unstable();
            ids.dedup();
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let now = Utc::now();
            let receipts: Vec<Value> = ids
                .iter()
                .map(|id| json!({ "message_id": id, "user_id": user_id, "read_at": now }))
                .collect();
            let written = self
                .db
                .upsert(MESSAGE_READS, receipts, &["message_id", "user_id"])
                .await?;
            decode_all(written)
        })
        .await
    }

    /// Starts live delivery of new messages in one conversation.
    pub async fn subscribe<F>(&self, conversation_id: Uuid, on_message: F) -> ServiceResult<ConversationFeed>
    where
        F: FnMut(Message) + Send + 'static,
    {
        run("messages.subscribe", async {
            let stream = self.db.subscribe(MESSAGES).await?;
            Ok(ConversationFeed::start(conversation_id, stream, on_message))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryTables;
    use crate::error::ErrorKind;
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};

    fn text(conversation_id: Uuid, sender_id: Uuid, text: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id,
            text: text.into(),
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn direct_conversation_is_reused() {
        let messages = MessageService::new(Arc::new(MemoryTables::with_portal_schema()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = messages.get_or_create_direct(a, b).await.into_result().unwrap();
        let again = messages.get_or_create_direct(b, a).await.into_result().unwrap();
        assert_eq!(first.id, again.id);
        assert!(messages.get_or_create_direct(a, a).await.error.is_some());
    }

    #[tokio::test]
    async fn sending_bumps_the_conversation() {
        let messages = MessageService::new(Arc::new(MemoryTables::with_portal_schema()));
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let ab = messages.get_or_create_direct(a, b).await.into_result().unwrap();
        let ac = messages.get_or_create_direct(a, c).await.into_result().unwrap();

        messages.send_message(&text(ab.id, a, "hello")).await.into_result().unwrap();
        let listed = messages.list_conversations(a).await.into_result().unwrap();
        assert_eq!(listed[0].id, ab.id);
        assert!(listed[0].last_message_at.is_some());
        assert_eq!(listed[1].id, ac.id);

        assert_eq!(messages.list_conversations(c).await.into_result().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let messages = MessageService::new(Arc::new(MemoryTables::with_portal_schema()));
        let err = messages
            .send_message(&text(Uuid::new_v4(), Uuid::new_v4(), "   "))
            .await
            .error
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn history_pages_backwards_oldest_first() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let messages = MessageService::new(db.clone());
        let (conversation, sender) = (Uuid::new_v4(), Uuid::new_v4());
        for (i, t) in ["a", "b", "c", "d"].iter().enumerate() {
            db.insert(
                MESSAGES,
                vec![json!({
                    "conversation_id": conversation,
                    "sender_id": sender,
                    "text": t,
                    "created_at": format!("2026-01-0{}T10:00:00Z", i + 1),
                })],
            )
            .await
            .unwrap();
        }
        let latest = messages.list_messages(conversation, None, 2).await.into_result().unwrap();
        let texts: Vec<_> = latest.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["c", "d"]);

        let older = messages
            .list_messages(conversation, latest[0].created_at, 2)
            .await
            .into_result()
            .unwrap();
        let texts: Vec<_> = older.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let messages = MessageService::new(db.clone());
        let (message, user) = (Uuid::new_v4(), Uuid::new_v4());
        messages.mark_read(&[message], user).await.into_result().unwrap();
        messages.mark_read(&[message], user).await.into_result().unwrap();
        assert_eq!(db.rows(MESSAGE_READS).len(), 1);
    }

    #[tokio::test]
    async fn repeated_ids_give_one_receipt() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let messages = MessageService::new(db.clone());
        let (first, second, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let receipts = messages
            .mark_read(&[first, second, first], user)
            .await
            .into_result()
            .unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(db.rows(MESSAGE_READS).len(), 2);
    }

    #[tokio::test]
    async fn subscription_sees_sent_messages() {
        let messages = MessageService::new(Arc::new(MemoryTables::with_portal_schema()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = messages.get_or_create_direct(a, b).await.into_result().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed = messages
            .subscribe(conversation.id, move |m: Message| {
                let _ = tx.send(m.text);
            })
            .await
            .into_result()
            .unwrap();

        messages.send_message(&text(conversation.id, b, "theirs")).await;
        let got = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, "theirs");
        drop(feed);
    }
}

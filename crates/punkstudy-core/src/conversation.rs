//! The append-only conversation log.
//!
//! The store never talks to the network on its own; callers either drive a
//! query end to end with [`ConversationStore::submit_query`] or split it into
//! [`ConversationStore::begin_query`] and [`ConversationStore::resolve_query`]
//! when the backend call runs on another task.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TransportError;
use crate::gateway::{Backend, QueryResult};
use crate::state::{Message, MessageIdGenerator, Sender};

pub const GREETING: &str =
    "Hey punk! Ready to study? Drop your notebooks and let's get started! 🤘";
pub const FALLBACK_ANSWER: &str = "I'm still rocking out your request! 🎸";
pub const APOLOGY: &str = "Oops! Something went wrong while processing your request. 😞";

/// How bot replies are placed when queries resolve out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOrdering {
    /// Append each reply as soon as its call resolves.
    #[default]
    Completion,
    /// Hold early replies until every earlier query has been answered.
    Submission,
}

impl ReplyOrdering {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyOrdering::Completion => "completion",
            ReplyOrdering::Submission => "submission",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completion" => Some(ReplyOrdering::Completion),
            "submission" => Some(ReplyOrdering::Submission),
            _ => None,
        }
    }
}

/// Ticket for a query whose user message is already in the log.
///
/// Not `Clone`: each ticket resolves exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingQuery {
    seq: u64,
    text: String,
}

impl PendingQuery {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    ids: MessageIdGenerator,
    ordering: ReplyOrdering,
    next_seq: u64,
    next_flush: u64,
    outstanding: BTreeSet<u64>,
    held: BTreeMap<u64, String>,
}

impl ConversationStore {
    pub fn new(ordering: ReplyOrdering) -> Self {
        Self {
            ordering,
            ..Self::default()
        }
    }

    /// A store that opens with the bot's greeting.
    pub fn with_greeting(ordering: ReplyOrdering) -> Self {
        let mut store = Self::new(ordering);
        store.push(Sender::Bot, GREETING.to_string());
        store
    }

    pub fn ordering(&self) -> ReplyOrdering {
        self.ordering
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Queries begun but whose reply is not in the log yet.
    pub fn awaiting_replies(&self) -> usize {
        self.outstanding.len() + self.held.len()
    }

    fn push(&mut self, sender: Sender, content: String) -> &Message {
        let timestamp = Utc::now();
        let id = self.ids.next_id(timestamp);
        self.messages.push(Message {
            id,
            content,
            sender,
            timestamp,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Appends a user message. Blank text is ignored.
    pub fn append_user_message(&mut self, text: &str) -> Option<&Message> {
        if text.trim().is_empty() {
            return None;
        }
        Some(self.push(Sender::User, text.to_string()))
    }

    /// Appends the user message and hands back a ticket for the backend call.
    pub fn begin_query(&mut self, text: &str) -> Option<PendingQuery> {
        self.append_user_message(text)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outstanding.insert(seq);
        Some(PendingQuery {
            seq,
            text: text.to_string(),
        })
    }

    /// Folds a resolved backend call into the log as a bot message.
    ///
    /// Tickets this store did not hand out, or that were already resolved,
    /// are ignored.
    pub fn resolve_query(
        &mut self,
        pending: PendingQuery,
        outcome: Result<QueryResult, TransportError>,
    ) {
        if !self.outstanding.remove(&pending.seq) {
            warn!(seq = pending.seq, "ignoring reply for a query that is not outstanding");
            return;
        }

        let content = match outcome {
            Ok(result) => result.answer_text().unwrap_or_else(|| {
                info!(seq = pending.seq, "backend reply had no answer");
                FALLBACK_ANSWER.to_string()
            }),
            Err(err) => {
                warn!(seq = pending.seq, error = %err, "query failed");
                APOLOGY.to_string()
            }
        };

        match self.ordering {
            ReplyOrdering::Completion => {
                self.push(Sender::Bot, content);
            }
            ReplyOrdering::Submission => {
                self.held.insert(pending.seq, content);
                while let Some(content) = self.held.remove(&self.next_flush) {
                    self.next_flush += 1;
                    self.push(Sender::Bot, content);
                }
            }
        }
    }

    /// Runs one query end to end. Returns false when `text` was blank.
    pub async fn submit_query(&mut self, backend: &dyn Backend, text: &str, user_id: &str) -> bool {
        let Some(pending) = self.begin_query(text) else {
            return false;
        };
        let outcome = backend.process_query(pending.text(), user_id).await;
        self.resolve_query(pending, outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GenerationResult, UploadResult};
    use crate::upload::UploadFile;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned replies and records the queries it saw.
    struct Scripted {
        replies: Mutex<Vec<Result<QueryResult, TransportError>>>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<QueryResult, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Backend for Scripted {
        async fn upload_document(
            &self,
            _file: &UploadFile,
            _user_id: &str,
        ) -> Result<UploadResult, TransportError> {
            unreachable!("store never uploads")
        }

        async fn process_query(
            &self,
            query: &str,
            user_id: &str,
        ) -> Result<QueryResult, TransportError> {
            self.seen.lock().unwrap().push((query.to_string(), user_id.to_string()));
            self.replies.lock().unwrap().remove(0)
        }

        async fn generate_text(
            &self,
            _prompt: &str,
            _max_length: u32,
        ) -> Result<GenerationResult, TransportError> {
            unreachable!("store never generates")
        }
    }

    fn failure() -> TransportError {
        TransportError::Status { operation: "query", status: 500, body: String::new() }
    }

    #[tokio::test]
    async fn test_answer_appended_after_user_message() {
        let backend = Scripted::new(vec![Ok(QueryResult::answer("42"))]);
        let mut store = ConversationStore::new(ReplyOrdering::Completion);

        assert!(store.submit_query(&backend, "meaning of life?", "default_user").await);

        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[0].sender, Sender::User);
        assert_eq!(store.messages()[0].content, "meaning of life?");
        assert_eq!(store.messages()[1].sender, Sender::Bot);
        assert_eq!(store.messages()[1].content, "42");
        assert_eq!(
            backend.seen.lock().unwrap()[0],
            ("meaning of life?".to_string(), "default_user".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_answer_uses_fallback() {
        let backend = Scripted::new(vec![Ok(QueryResult(json!({ "sources": [] })))]);
        let mut store = ConversationStore::new(ReplyOrdering::Completion);
        store.submit_query(&backend, "hello", "u").await;
        assert_eq!(store.len(), 2);
        assert_eq!(store.last().unwrap().content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_transport_failure_appends_apology() {
        let backend = Scripted::new(vec![Err(failure())]);
        let mut store = ConversationStore::with_greeting(ReplyOrdering::Completion);
        let before = store.len();
        assert!(store.submit_query(&backend, "hello", "u").await);
        assert_eq!(store.len(), before + 2);
        assert_eq!(store.last().unwrap().content, APOLOGY);
        assert_eq!(store.last().unwrap().sender, Sender::Bot);
    }

    #[tokio::test]
    async fn test_blank_submission_is_noop() {
        let backend = Scripted::new(vec![]);
        let mut store = ConversationStore::new(ReplyOrdering::Completion);
        assert!(!store.submit_query(&backend, "", "u").await);
        assert!(!store.submit_query(&backend, "   \t\n", "u").await);
        assert!(store.is_empty());
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_append_user_message_does_not_call_backend() {
        let mut store = ConversationStore::new(ReplyOrdering::Completion);
        let msg = store.append_user_message("notes please").unwrap();
        assert_eq!(msg.sender, Sender::User);
        assert_eq!(store.len(), 1);
        assert_eq!(store.awaiting_replies(), 0);
        assert!(store.append_user_message(" ").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_completion_order_follows_resolution() {
        let mut store = ConversationStore::new(ReplyOrdering::Completion);
        let a = store.begin_query("A").unwrap();
        let b = store.begin_query("B").unwrap();
        assert_eq!(store.awaiting_replies(), 2);

        store.resolve_query(b, Ok(QueryResult::answer("answer B")));
        store.resolve_query(a, Ok(QueryResult::answer("answer A")));

        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["A", "B", "answer B", "answer A"]);
        assert_eq!(store.awaiting_replies(), 0);
    }

    #[test]
    fn test_submission_order_holds_early_replies() {
        let mut store = ConversationStore::new(ReplyOrdering::Submission);
        let a = store.begin_query("A").unwrap();
        let b = store.begin_query("B").unwrap();
        let c = store.begin_query("C").unwrap();

        store.resolve_query(c, Ok(QueryResult::answer("answer C")));
        store.resolve_query(b, Err(failure()));
        assert_eq!(store.len(), 3);
        assert_eq!(store.awaiting_replies(), 3);

        store.resolve_query(a, Ok(QueryResult::answer("answer A")));

        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["A", "B", "C", "answer A", APOLOGY, "answer C"]);
        assert_eq!(store.awaiting_replies(), 0);
    }

    #[test]
    fn test_duplicate_ticket_ignored_in_completion_mode() {
        let mut store = ConversationStore::new(ReplyOrdering::Completion);
        let a = store.begin_query("A").unwrap();
        let forged = PendingQuery { seq: a.seq(), text: "A".to_string() };

        store.resolve_query(a, Ok(QueryResult::answer("answer A")));
        store.resolve_query(forged, Ok(QueryResult::answer("again")));

        assert_eq!(store.len(), 2);
        assert_eq!(store.last().unwrap().content, "answer A");
        assert_eq!(store.awaiting_replies(), 0);

        let b = store.begin_query("B").unwrap();
        assert_eq!(store.awaiting_replies(), 1);
        store.resolve_query(b, Err(failure()));
        assert_eq!(store.awaiting_replies(), 0);
    }

    #[test]
    fn test_duplicate_and_unknown_tickets_ignored_in_submission_mode() {
        let mut store = ConversationStore::new(ReplyOrdering::Submission);
        let a = store.begin_query("A").unwrap();
        let b = store.begin_query("B").unwrap();
        let forged = PendingQuery { seq: a.seq(), text: "A".to_string() };
        let unknown = PendingQuery { seq: 99, text: "?".to_string() };

        store.resolve_query(a, Ok(QueryResult::answer("answer A")));
        store.resolve_query(forged, Ok(QueryResult::answer("again")));
        store.resolve_query(unknown, Ok(QueryResult::answer("stray")));
        assert_eq!(store.awaiting_replies(), 1);

        store.resolve_query(b, Ok(QueryResult::answer("answer B")));

        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["A", "B", "answer A", "answer B"]);
        assert_eq!(store.awaiting_replies(), 0);
    }

    #[test]
    fn test_ids_unique_and_ordered() {
        let mut store = ConversationStore::with_greeting(ReplyOrdering::Completion);
        for i in 0..20 {
            let pending = store.begin_query(&format!("q{i}")).unwrap();
            store.resolve_query(pending, Ok(QueryResult::answer("ok")));
        }
        let mut ids: Vec<&str> = store.messages().iter().map(|m| m.id.as_str()).collect();
        let total = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(store
            .messages()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_greeting_is_first_message() {
        let store = ConversationStore::with_greeting(ReplyOrdering::default());
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].content, GREETING);
        assert_eq!(store.messages()[0].sender, Sender::Bot);
    }

    #[test]
    fn test_ordering_from_str() {
        assert_eq!(ReplyOrdering::from_str("Submission"), Some(ReplyOrdering::Submission));
        assert_eq!(ReplyOrdering::from_str("completion"), Some(ReplyOrdering::Completion));
        assert_eq!(ReplyOrdering::from_str("random"), None);
    }
}

//! UI-agnostic conversation types
//!
//! Shared by the TUI and the one-shot CLI commands; nothing here depends on a
//! rendering layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

/// Hands out time-derived message ids that never repeat within a session.
///
/// The counter suffix keeps ids distinct even when several messages are
/// created inside the same millisecond.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    counter: u64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        self.counter += 1;
        format!("{}-{}", now.timestamp_millis(), self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_unique_within_same_millisecond() {
        let mut ids = MessageIdGenerator::new();
        let now = Utc::now();
        let generated: HashSet<String> = (0..100).map(|_| ids.next_id(now)).collect();
        assert_eq!(generated.len(), 100);
    }

    #[test]
    fn test_sender_serializes_lowercase() {
        let json = serde_json::to_string(&Sender::Bot).unwrap();
        assert_eq!(json, "\"bot\"");
        assert_eq!(Sender::User.as_str(), "user");
    }
}

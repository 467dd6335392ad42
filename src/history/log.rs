use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::HistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One attributed utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Append-only transcript with optional write-through persistence
pub struct ConversationLog {
    turns: Vec<Turn>,
    store: Option<Box<dyn HistoryStore>>,
}

impl ConversationLog {
    /// In-memory log; nothing survives a restart
    pub fn in_memory() -> Self {
        Self {
            turns: Vec::new(),
            store: None,
        }
    }

    /// Log backed by `store`, restored from it immediately
    ///
    /// An unreadable store starts an empty log rather than failing the
    /// session.
    pub fn persistent(store: Box<dyn HistoryStore>) -> Self {
        let mut log = Self {
            turns: Vec::new(),
            store: None,
        };

        match store.load() {
            Ok(snapshot) => log.restore(snapshot),
            Err(e) => warn!("Starting with empty history: {}", e),
        }

        log.store = Some(store);
        log
    }

    /// Append a turn and persist the full updated snapshot
    ///
    /// The turn is kept in memory even if persisting fails.
    pub fn append(&mut self, turn: Turn) {
        debug!("History += {:?}: {}", turn.role, turn.content);
        self.turns.push(turn);

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.turns) {
                warn!("{}", e);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Replace the in-memory contents with a previously persisted snapshot
    pub fn restore(&mut self, snapshot: Vec<Turn>) {
        info!("Restored {} turns of history", snapshot.len());
        self.turns = snapshot;
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Last turn, if any
    pub fn latest(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = ConversationLog::in_memory();

        log.append(Turn::new(Role::User, "one"));
        log.append(Turn::new(Role::Assistant, "two"));
        log.append(Turn::new(Role::User, "three"));

        let contents: Vec<_> = log.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(log.latest().map(|t| t.role), Some(Role::User));
    }

    #[test]
    fn test_restore_then_snapshot_is_identity() {
        let snapshot = vec![
            Turn::new(Role::User, "hello"),
            Turn::new(Role::Assistant, "hi there"),
        ];

        let mut log = ConversationLog::in_memory();
        log.restore(snapshot.clone());

        assert_eq!(log.snapshot(), snapshot);
    }

    #[test]
    fn test_turn_wire_shape() {
        let json = serde_json::to_string(&Turn::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}

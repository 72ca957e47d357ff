//! Conversation state: history, draft, session identity and the reasoning flag.
//!
//! History and session id are written to [`ChatStorage`] after every change
//! when the store has one. The draft and the reasoning flag never are.

use crate::storage::{ChatStorage, StorageError};
use shared::chat_api::{ChatMessage, Role};
use shared::ids::{Clock, IdGenerator, SystemClock, UuidIds};
use std::fmt;
use std::sync::Arc;

/// Shown when the service answers with an empty answer.
pub const EMPTY_ANSWER_PLACEHOLDER: &str = "Something went wrong";
/// Shown when a failure carries no description.
pub const FALLBACK_ERROR: &str = "Error processing request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningState {
    Idle,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("A request is already pending")]
    AlreadyPending,
}

/// What `begin_send` hands to the caller for the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub question: String,
    pub session_id: String,
    pub user_id: String,
}

pub struct ConversationStore {
    draft_text: String,
    messages: Vec<ChatMessage>,
    reasoning: ReasoningState,
    session_id: String,
    user_id: String,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    storage: Option<ChatStorage>,
}

impl ConversationStore {
    /// In-memory store with a fresh session.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_collaborators(user_id, Arc::new(UuidIds), Arc::new(SystemClock), None)
    }

    /// Store backed by `storage`, restoring any saved history and session id.
    pub fn open(storage: ChatStorage, user_id: impl Into<String>) -> Self {
        Self::with_collaborators(
            user_id,
            Arc::new(UuidIds),
            Arc::new(SystemClock),
            Some(storage),
        )
    }

    pub fn with_collaborators(
        user_id: impl Into<String>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        storage: Option<ChatStorage>,
    ) -> Self {
        let restored = storage.as_ref().and_then(|s| match s.load() {
            Ok(record) => record,
            Err(StorageError::Corrupt(e)) => {
                match s.quarantine() {
                    Ok(aside) => tracing::warn!(
                        moved_to = %aside.display(),
                        "stored chat is unreadable, starting a fresh chat: {}",
                        e
                    ),
                    Err(move_err) => tracing::warn!(
                        path = %s.path().display(),
                        "stored chat is unreadable and could not be moved aside ({}): {}",
                        move_err,
                        e
                    ),
                }
                None
            }
            Err(e) => {
                tracing::warn!(path = %s.path().display(), "starting a fresh chat: {}", e);
                None
            }
        });

        let (messages, session_id, needs_save) = match restored {
            Some(record) => (record.messages, record.session_id, false),
            None => (Vec::new(), ids.next_id(), true),
        };

        let store = Self {
            draft_text: String::new(),
            messages,
            reasoning: ReasoningState::Idle,
            session_id,
            user_id: user_id.into(),
            ids,
            clock,
            storage,
        };
        if needs_save {
            store.persist();
        }
        tracing::debug!(
            session_id = %store.session_id,
            messages = store.messages.len(),
            "conversation loaded"
        );
        store
    }

    pub fn draft_text(&self) -> &str {
        &self.draft_text
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn reasoning(&self) -> ReasoningState {
        self.reasoning
    }

    pub fn is_reasoning(&self) -> bool {
        self.reasoning == ReasoningState::Pending
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Replace the draft verbatim.
    pub fn set_draft_text(&mut self, text: impl Into<String>) {
        self.draft_text = text.into();
    }

    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> &ChatMessage {
        let message = ChatMessage {
            id: self.ids.next_id(),
            role,
            content: content.into(),
            timestamp: self.clock.now_millis(),
        };
        self.messages.push(message);
        self.persist();
        &self.messages[self.messages.len() - 1]
    }

    /// Turn the draft into a user message and enter the pending state.
    ///
    /// A blank draft is ignored (`Ok(None)`). While a request is pending,
    /// nothing changes and `AlreadyPending` is returned.
    pub fn begin_send(&mut self) -> Result<Option<OutgoingMessage>, SendError> {
        if self.is_reasoning() {
            return Err(SendError::AlreadyPending);
        }
        let question = self.draft_text.trim().to_string();
        if question.is_empty() {
            return Ok(None);
        }

        self.append_message(Role::User, question.clone());
        self.draft_text.clear();
        self.reasoning = ReasoningState::Pending;
        tracing::info!(session_id = %self.session_id, "message sent");

        Ok(Some(OutgoingMessage {
            question,
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
        }))
    }

    /// Resolve the pending request with its answer or its failure.
    ///
    /// Always leaves the idle state and appends exactly one assistant message.
    pub fn end_send<E: fmt::Display>(&mut self, outcome: Result<String, E>) -> &ChatMessage {
        self.reasoning = ReasoningState::Idle;
        let content = match outcome {
            Ok(answer) if answer.trim().is_empty() => EMPTY_ANSWER_PLACEHOLDER.to_string(),
            Ok(answer) => answer,
            Err(e) => {
                let description = e.to_string();
                tracing::warn!(session_id = %self.session_id, "chat query failed: {}", description);
                if description.trim().is_empty() {
                    format!("Error: {}", FALLBACK_ERROR)
                } else {
                    format!("Error: {}", description)
                }
            }
        };
        self.append_message(Role::Assistant, content)
    }

    /// Leave the pending state without adding anything to the history.
    pub fn stop_reasoning(&mut self) {
        self.reasoning = ReasoningState::Idle;
    }

    /// Empty the history and start a new session. Draft and flag are untouched.
    pub fn clear_conversation(&mut self) {
        self.messages.clear();
        self.session_id = self.ids.next_id();
        self.persist();
        tracing::info!(session_id = %self.session_id, "conversation cleared");
    }

    fn persist(&self) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save(&self.messages, &self.session_id) {
                tracing::warn!(path = %storage.path().display(), "failed to save chat: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ids::{ManualClock, SequentialIds};
    use std::fs;
    use tempfile::TempDir;

    fn store_in(dir: Option<&TempDir>) -> ConversationStore {
        ConversationStore::with_collaborators(
            "user-default",
            Arc::new(SequentialIds::new("id")),
            Arc::new(ManualClock::new(1_000)),
            dir.map(|d| ChatStorage::new(d.path())),
        )
    }

    #[test]
    fn test_draft_is_stored_verbatim() {
        let mut store = store_in(None);
        store.set_draft_text("  spaced out  ");
        assert_eq!(store.draft_text(), "  spaced out  ");
    }

    #[test]
    fn test_append_assigns_id_and_timestamp() {
        let mut store = store_in(None);
        let msg = store.append_message(Role::Assistant, "welcome").clone();
        // id-1 went to the session
        assert_eq!(msg.id, "id-2");
        assert_eq!(msg.timestamp, 1_000);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn test_begin_send_trims_and_enters_pending() {
        let mut store = store_in(None);
        store.set_draft_text("  What does this code do?\n");

        let outgoing = store.begin_send().unwrap().unwrap();
        assert_eq!(outgoing.question, "What does this code do?");
        assert_eq!(outgoing.session_id, store.session_id());
        assert_eq!(outgoing.user_id, "user-default");

        assert!(store.is_reasoning());
        assert_eq!(store.draft_text(), "");
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].role, Role::User);
        assert_eq!(store.messages()[0].content, "What does this code do?");
    }

    #[test]
    fn test_blank_draft_is_ignored() {
        let mut store = store_in(None);
        for draft in ["", "   ", "\n\t "] {
            store.set_draft_text(draft);
            assert_eq!(store.begin_send(), Ok(None));
            assert!(!store.is_reasoning());
            assert!(store.messages().is_empty());
            assert_eq!(store.draft_text(), draft);
        }
    }

    #[test]
    fn test_second_send_while_pending_is_refused() {
        let mut store = store_in(None);
        store.set_draft_text("first");
        store.begin_send().unwrap();
        store.set_draft_text("second");

        assert_eq!(store.begin_send(), Err(SendError::AlreadyPending));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.draft_text(), "second");
        assert!(store.is_reasoning());
    }

    #[test]
    fn test_end_send_success() {
        let mut store = store_in(None);
        store.set_draft_text("hi");
        store.begin_send().unwrap();

        let reply = store.end_send(Ok::<_, String>("Hello!".to_string())).clone();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hello!");
        assert!(!store.is_reasoning());
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn test_end_send_empty_answer_uses_placeholder() {
        let mut store = store_in(None);
        let reply = store.end_send(Ok::<_, String>(String::new()));
        assert_eq!(reply.content, EMPTY_ANSWER_PLACEHOLDER);
    }

    #[test]
    fn test_end_send_failure_from_idle() {
        let mut store = store_in(None);
        assert!(!store.is_reasoning());

        let reply = store
            .end_send(Err::<String, _>("connection refused"))
            .clone();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Error: connection refused");
        assert!(!store.is_reasoning());

        let reply = store.end_send(Err::<String, _>(""));
        assert_eq!(reply.content, "Error: Error processing request");
    }

    #[test]
    fn test_stop_reasoning_appends_nothing() {
        let mut store = store_in(None);
        store.set_draft_text("hi");
        store.begin_send().unwrap();

        store.stop_reasoning();
        assert_eq!(store.reasoning(), ReasoningState::Idle);
        assert_eq!(store.messages().len(), 1);

        store.set_draft_text("again");
        assert!(store.begin_send().unwrap().is_some());
    }

    #[test]
    fn test_clear_conversation_new_session() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(Some(&dir));
        store.set_draft_text("keep me");
        store.append_message(Role::User, "old");
        let old_session = store.session_id().to_string();

        store.clear_conversation();
        assert!(store.messages().is_empty());
        assert_ne!(store.session_id(), old_session);
        assert_eq!(store.draft_text(), "keep me");

        let reloaded = ChatStorage::new(dir.path()).load().unwrap().unwrap();
        assert!(reloaded.messages.is_empty());
        assert_eq!(reloaded.session_id, store.session_id());
    }

    #[test]
    fn test_clear_conversation_keeps_pending_flag() {
        let mut store = store_in(None);
        store.set_draft_text("hi");
        store.begin_send().unwrap();
        store.clear_conversation();
        assert!(store.is_reasoning());
    }

    #[test]
    fn test_reload_restores_history_and_session_only() {
        let dir = TempDir::new().unwrap();
        let (messages, session_id) = {
            let mut store = store_in(Some(&dir));
            store.set_draft_text("question");
            store.begin_send().unwrap();
            store.end_send(Ok::<_, String>("answer".into()));
            store.set_draft_text("unsent draft");
            store.set_draft_text("another");
            store.begin_send().unwrap();
            (store.messages().to_vec(), store.session_id().to_string())
        };

        let store = ConversationStore::open(ChatStorage::new(dir.path()), "user-default");
        assert_eq!(store.messages(), messages.as_slice());
        assert_eq!(store.session_id(), session_id);
        assert_eq!(store.draft_text(), "");
        assert!(!store.is_reasoning());
    }

    #[test]
    fn test_fresh_session_is_persisted() {
        let dir = TempDir::new().unwrap();
        let first = store_in(Some(&dir)).session_id().to_string();
        let again = ConversationStore::open(ChatStorage::new(dir.path()), "user-default");
        assert_eq!(again.session_id(), first);
    }

    #[test]
    fn test_corrupt_storage_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path());
        fs::write(storage.path(), b"{not json").unwrap();

        let store = ConversationStore::open(storage.clone(), "user-default");
        assert!(store.messages().is_empty());
        let saved = storage.load().unwrap().unwrap();
        assert_eq!(saved.session_id, store.session_id());

        let aside = dir.path().join("chat-storage.json.corrupt");
        assert_eq!(fs::read(aside).unwrap(), b"{not json");
    }
}

//! One user turn: record the question, ask the backend, record the answer.
//!
//! The turn is split in two so an interactive caller can run the backend
//! call on a background task: [`begin_turn`] mutates and persists the session
//! before any network traffic, [`finish_turn`] applies whatever came back.

use tracing::{debug, error, warn};

use crate::api::Generator;
use crate::error::{ChatError, GenerateError};
use crate::normalize::format_code_blocks;
use crate::session::{ConversationId, MessageId, SessionStore};

/// A send that is waiting for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub conversation_id: ConversationId,
    pub placeholder_id: MessageId,
    pub query: String,
}

/// Record the user message and its placeholder.
///
/// Empty text, an unknown conversation, or a conversation that is already
/// waiting on a response are rejected without touching the session.
pub fn begin_turn(
    store: &mut SessionStore,
    conversation_id: &ConversationId,
    text: &str,
) -> Result<Turn, ChatError> {
    let placeholder_id = store.open_turn(conversation_id, text)?;
    debug!(conversation = %conversation_id, "waiting for response");
    Ok(Turn {
        conversation_id: conversation_id.clone(),
        placeholder_id,
        query: text.to_string(),
    })
}

/// Apply the backend outcome to the placeholder.
///
/// On success the formatted response replaces the placeholder. On failure
/// the placeholder is removed and the backend error is handed back.
pub fn finish_turn(
    store: &mut SessionStore,
    turn: &Turn,
    outcome: Result<String, GenerateError>,
) -> Result<(), ChatError> {
    match outcome {
        Ok(response) => {
            let formatted = format_code_blocks(&response);
            store.resolve_turn(&turn.conversation_id, &turn.placeholder_id, &formatted)?;
            debug!(conversation = %turn.conversation_id, chars = formatted.len(), "response recorded");
            Ok(())
        }
        Err(e) => {
            error!(conversation = %turn.conversation_id, error = %e, "generation failed");
            if let Err(cleanup) = store.abandon_turn(&turn.conversation_id, &turn.placeholder_id) {
                warn!(error = %cleanup, "placeholder already gone");
            }
            Err(ChatError::Generation(e))
        }
    }
}

/// Run a whole turn against `generator`.
pub async fn send<G: Generator + ?Sized>(
    store: &mut SessionStore,
    generator: &G,
    conversation_id: &ConversationId,
    text: &str,
) -> Result<(), ChatError> {
    let turn = begin_turn(store, conversation_id, text)?;
    let outcome = generator.generate(&turn.query).await;
    finish_turn(store, &turn, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Sender, HISTORY_KEY};
    use crate::storage::{KeyValueStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        reply: Result<&'static str, u16>,
        queries: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn ok(reply: &'static str) -> Self {
            Self { reply: Ok(reply), queries: Mutex::new(Vec::new()) }
        }

        fn status(code: u16) -> Self {
            Self { reply: Err(code), queries: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, query: &str) -> Result<String, GenerateError> {
            self.queries.lock().unwrap().push(query.to_string());
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(code) => Err(GenerateError::Http {
                    status: reqwest::StatusCode::from_u16(code).unwrap(),
                    body: String::new(),
                }),
            }
        }
    }

    /// Reads what is persisted at the moment the backend is called.
    struct Snapshotting {
        backend: Arc<MemoryStore>,
        seen: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Generator for Snapshotting {
        async fn generate(&self, _query: &str) -> Result<String, GenerateError> {
            *self.seen.lock().unwrap() = self.backend.load(HISTORY_KEY).unwrap();
            Ok("resposta".to_string())
        }
    }

    fn fresh_store() -> (SessionStore, ConversationId) {
        let store = SessionStore::load(Box::new(MemoryStore::new()));
        let id = store.collection().active_id().cloned().unwrap();
        (store, id)
    }

    fn message_count(store: &SessionStore, id: &ConversationId) -> usize {
        store.collection().get(id).unwrap().messages.len()
    }

    #[tokio::test]
    async fn success_adds_user_and_assistant() {
        let (mut store, id) = fresh_store();
        let before = message_count(&store, &id);
        let generator = Scripted::ok("Use isto:\n```java\nprintln 'oi'\n```");

        send(&mut store, &generator, &id, "como imprimir?").await.unwrap();

        let conversation = store.collection().get(&id).unwrap();
        assert_eq!(conversation.messages.len(), before + 2);
        let reply = conversation.messages.last().unwrap();
        assert_eq!(reply.sender, Sender::Assistant);
        assert!(!reply.pending);
        assert_eq!(reply.content, "Use isto:\n```groovy\nprintln 'oi'\n```");
        assert_eq!(conversation.last_message_preview, "Use isto: ```groovy println 'oi' ```");
        assert_eq!(*generator.queries.lock().unwrap(), vec!["como imprimir?".to_string()]);
    }

    #[tokio::test]
    async fn failure_keeps_only_user_message() {
        let (mut store, id) = fresh_store();
        let before = message_count(&store, &id);

        let err = send(&mut store, &Scripted::status(502), &id, "vai falhar").await.unwrap_err();
        assert!(matches!(err, ChatError::Generation(GenerateError::Http { .. })));

        let conversation = store.collection().get(&id).unwrap();
        assert_eq!(conversation.messages.len(), before + 1);
        assert!(conversation.messages.iter().all(|m| !m.pending));
        assert_eq!(conversation.messages.last().unwrap().content, "vai falhar");
    }

    #[tokio::test]
    async fn question_is_persisted_before_backend_call() {
        let backend = Arc::new(MemoryStore::new());
        let mut store = SessionStore::load(Box::new(Arc::clone(&backend)));
        let id = store.collection().active_id().cloned().unwrap();
        let generator = Snapshotting { backend, seen: Mutex::new(None) };

        send(&mut store, &generator, &id, "como ler um arquivo?").await.unwrap();

        let seen = generator.seen.lock().unwrap().clone().expect("history written before generate");
        let history: serde_json::Value = serde_json::from_str(&seen).unwrap();
        let messages = history[0]["messages"].as_array().unwrap();
        let question = &messages[messages.len() - 2];
        let placeholder = &messages[messages.len() - 1];
        assert_eq!(question["sender"], "user");
        assert_eq!(question["content"], "como ler um arquivo?");
        assert_eq!(placeholder["sender"], "assistant");
        assert_eq!(placeholder["isLoading"], true);
    }

    #[tokio::test]
    async fn empty_text_never_reaches_backend() {
        let (mut store, id) = fresh_store();
        let generator = Scripted::ok("nunca");

        let err = send(&mut store, &generator, &id, "  ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert_eq!(message_count(&store, &id), 1);
        assert!(generator.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn send_while_awaiting_is_rejected() {
        let (mut store, id) = fresh_store();
        let turn = begin_turn(&mut store, &id, "primeira").unwrap();
        let count = message_count(&store, &id);

        assert!(matches!(begin_turn(&mut store, &id, "segunda"), Err(ChatError::Busy(_))));
        assert_eq!(message_count(&store, &id), count);

        finish_turn(&mut store, &turn, Ok("pronto".to_string())).unwrap();
        assert!(begin_turn(&mut store, &id, "segunda").is_ok());
    }

    #[test]
    fn conversations_wait_independently() {
        let (mut store, first) = fresh_store();
        let second = store.create_conversation();

        let a = begin_turn(&mut store, &first, "pergunta a").unwrap();
        let b = begin_turn(&mut store, &second, "pergunta b").unwrap();

        finish_turn(&mut store, &b, Ok("resposta b".to_string())).unwrap();
        finish_turn(&mut store, &a, Ok("resposta a".to_string())).unwrap();

        let last = |id: &ConversationId| store.collection().get(id).unwrap().messages.last().unwrap().content.clone();
        assert_eq!(last(&first), "resposta a");
        assert_eq!(last(&second), "resposta b");
    }

    #[test]
    fn finishing_a_deleted_conversation_is_not_found() {
        let (mut store, id) = fresh_store();
        let turn = begin_turn(&mut store, &id, "pergunta").unwrap();
        store.delete_conversation(&id).unwrap();

        let err = finish_turn(&mut store, &turn, Ok("tarde demais".to_string())).unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }
}

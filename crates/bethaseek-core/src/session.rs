//! Conversations, their messages, and the persisted session collection.
//!
//! [`SessionCollection`] holds the in-memory state and enforces its
//! invariants: a non-empty list always has an active conversation, and a
//! conversation has at most one pending message, always the last one.
//! [`SessionStore`] wraps a collection and writes it through a
//! [`KeyValueStore`] after every mutation.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, StorageError};
use crate::storage::KeyValueStore;
use crate::title::{derive_title, preview, DEFAULT_TITLE};

pub const HISTORY_KEY: &str = "chat-history";
pub const ACTIVE_KEY: &str = "chat-active";

pub const GREETING: &str = "Olá! Como posso ajudar você hoje?";
pub const NEW_CONVERSATION_PREVIEW: &str = "Conversa iniciada";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Placeholder for a response that has not arrived yet.
    #[serde(default, rename = "isLoading", skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl Message {
    fn new(sender: Sender, content: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            content: content.to_string(),
            sender,
            timestamp,
            pending: false,
        }
    }

    fn placeholder(timestamp: DateTime<Utc>) -> Self {
        Self {
            pending: true,
            ..Self::new(Sender::Assistant, "", timestamp)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    #[serde(rename = "lastMessage")]
    pub last_message_preview: String,
    #[serde(rename = "timestamp")]
    pub last_activity: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// A fresh conversation holding only the assistant greeting.
    pub fn new_default() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::generate(),
            title: DEFAULT_TITLE.to_string(),
            last_message_preview: NEW_CONVERSATION_PREVIEW.to_string(),
            last_activity: now,
            messages: vec![Message::new(Sender::Assistant, GREETING, now)],
        }
    }

    /// Waiting on the backend: the last message is a placeholder.
    pub fn is_awaiting(&self) -> bool {
        self.messages.last().is_some_and(|m| m.pending)
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.sender == Sender::User)
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant && !m.pending)
    }

    fn pending_index(&self, placeholder_id: &MessageId) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.pending && &m.id == placeholder_id)
    }

    fn validate(&self) -> Result<(), String> {
        let pending = self.messages.iter().filter(|m| m.pending).count();
        if pending > 1 {
            return Err(format!("conversation {} has {} pending messages", self.id, pending));
        }
        if pending == 1 && !self.is_awaiting() {
            return Err(format!("conversation {} has a pending message that is not last", self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionCollection {
    conversations: Vec<Conversation>,
    active_id: Option<ConversationId>,
}

impl SessionCollection {
    /// One greeting conversation, active.
    pub fn new_default() -> Self {
        let conversation = Conversation::new_default();
        Self {
            active_id: Some(conversation.id.clone()),
            conversations: vec![conversation],
        }
    }

    /// Rebuild a collection from stored conversations. The active id is kept
    /// when it names a member, otherwise the first conversation is activated.
    pub fn from_parts(conversations: Vec<Conversation>, active_id: Option<ConversationId>) -> Self {
        if conversations.is_empty() {
            return Self::new_default();
        }
        let active_id = active_id
            .filter(|id| conversations.iter().any(|c| &c.id == id))
            .or_else(|| conversations.first().map(|c| c.id.clone()));
        Self {
            conversations,
            active_id,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active_id.as_ref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_ref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    fn get_mut(&mut self, id: &ConversationId) -> Result<&mut Conversation, ChatError> {
        self.conversations
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))
    }

    pub fn create_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::new_default();
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.active_id = Some(id.clone());
        debug!(conversation = %id, "created conversation");
        id
    }

    pub fn delete_conversation(&mut self, id: &ConversationId) -> Result<(), ChatError> {
        let index = self
            .conversations
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;
        self.conversations.remove(index);
        debug!(conversation = %id, "deleted conversation");

        if self.active_id.as_ref() == Some(id) {
            match self.conversations.first().map(|c| c.id.clone()) {
                Some(first) => self.active_id = Some(first),
                None => {
                    self.create_conversation();
                }
            }
        }
        Ok(())
    }

    /// Unknown ids are rejected and leave the selection unchanged.
    pub fn select_conversation(&mut self, id: &ConversationId) -> Result<(), ChatError> {
        if self.get(id).is_none() {
            return Err(ChatError::NotFound(id.clone()));
        }
        self.active_id = Some(id.clone());
        Ok(())
    }

    /// Append the user's message and a pending placeholder in one step.
    ///
    /// The first user message of a conversation also sets its title.
    /// Returns the placeholder id, which [`Self::resolve_turn`] or
    /// [`Self::abandon_turn`] later consumes.
    pub fn open_turn(&mut self, id: &ConversationId, text: &str) -> Result<MessageId, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let conversation = self.get_mut(id)?;
        if conversation.is_awaiting() {
            return Err(ChatError::Busy(id.clone()));
        }

        let now = Utc::now();
        if !conversation.has_user_message() {
            conversation.title = derive_title(text);
        }
        conversation.messages.push(Message::new(Sender::User, text, now));

        let placeholder = Message::placeholder(now);
        let placeholder_id = placeholder.id.clone();
        conversation.messages.push(placeholder);

        conversation.last_message_preview = preview(text);
        conversation.last_activity = now;
        Ok(placeholder_id)
    }

    /// Replace the placeholder, in place, with the finished response.
    pub fn resolve_turn(
        &mut self,
        id: &ConversationId,
        placeholder_id: &MessageId,
        content: &str,
    ) -> Result<(), ChatError> {
        let conversation = self.get_mut(id)?;
        let index = conversation
            .pending_index(placeholder_id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;

        let now = Utc::now();
        let message = &mut conversation.messages[index];
        message.content = content.to_string();
        message.timestamp = now;
        message.pending = false;

        conversation.last_message_preview = preview(content);
        conversation.last_activity = now;
        Ok(())
    }

    /// Drop the placeholder after a failed request; the user message stays.
    pub fn abandon_turn(&mut self, id: &ConversationId, placeholder_id: &MessageId) -> Result<(), ChatError> {
        let conversation = self.get_mut(id)?;
        let index = conversation
            .pending_index(placeholder_id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;
        conversation.messages.remove(index);
        Ok(())
    }

    /// Remove placeholders left behind by an interrupted session.
    /// Returns how many were dropped.
    pub fn reconcile_pending(&mut self) -> usize {
        let mut dropped = 0;
        for conversation in &mut self.conversations {
            let before = conversation.messages.len();
            conversation.messages.retain(|m| !m.pending);
            dropped += before - conversation.messages.len();
        }
        dropped
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.conversations)
    }
}

/// Parse and validate the stored conversation list.
pub fn parse_conversations(raw: &str) -> Result<Vec<Conversation>, StorageError> {
    let conversations: Vec<Conversation> =
        serde_json::from_str(raw).map_err(|e| StorageError::read(HISTORY_KEY, e))?;

    if conversations.is_empty() {
        return Err(StorageError::read(HISTORY_KEY, "history is empty"));
    }

    let mut seen = HashSet::new();
    for conversation in &conversations {
        if !seen.insert(&conversation.id) {
            return Err(StorageError::read(
                HISTORY_KEY,
                format!("duplicate conversation id {}", conversation.id),
            ));
        }
        conversation
            .validate()
            .map_err(|reason| StorageError::read(HISTORY_KEY, reason))?;
    }
    Ok(conversations)
}

pub struct SessionStore {
    collection: SessionCollection,
    backend: Box<dyn KeyValueStore>,
}

impl SessionStore {
    /// Load the saved collection, or start fresh when there is nothing usable.
    ///
    /// Read failures are logged and never reach the caller.
    pub fn load(backend: Box<dyn KeyValueStore>) -> Self {
        let collection = match Self::read_collection(backend.as_ref()) {
            Ok(Some(mut collection)) => {
                let dropped = collection.reconcile_pending();
                if dropped > 0 {
                    warn!(dropped, "discarded placeholders from an interrupted request");
                }
                info!(conversations = collection.len(), "loaded chat history");
                collection
            }
            Ok(None) => {
                info!("no chat history yet, starting a new conversation");
                SessionCollection::new_default()
            }
            Err(e) => {
                warn!(error = %e, "chat history unreadable, starting a new conversation");
                SessionCollection::new_default()
            }
        };
        Self {
            collection,
            backend,
        }
    }

    fn read_collection(backend: &dyn KeyValueStore) -> Result<Option<SessionCollection>, StorageError> {
        let Some(raw) = backend.load(HISTORY_KEY)? else {
            return Ok(None);
        };
        let conversations = parse_conversations(&raw)?;

        // A bad active id only costs the selection, not the history.
        let active_id = match backend.load(ACTIVE_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<ConversationId>(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not read active conversation");
                None
            }
        };
        Ok(Some(SessionCollection::from_parts(conversations, active_id)))
    }

    pub fn collection(&self) -> &SessionCollection {
        &self.collection
    }

    pub fn try_save(&self) -> Result<(), StorageError> {
        let history = self
            .collection
            .to_json()
            .map_err(|e| StorageError::write(HISTORY_KEY, e))?;
        self.backend.save(HISTORY_KEY, &history)?;

        if let Some(active_id) = self.collection.active_id() {
            let active = serde_json::to_string(active_id).map_err(|e| StorageError::write(ACTIVE_KEY, e))?;
            self.backend.save(ACTIVE_KEY, &active)?;
        }
        Ok(())
    }

    /// Persist the collection; failures are logged and the in-memory state stays authoritative.
    pub fn save(&self) {
        if let Err(e) = self.try_save() {
            error!(error = %e, "failed to save chat history");
        }
    }

    pub fn create_conversation(&mut self) -> ConversationId {
        let id = self.collection.create_conversation();
        self.save();
        id
    }

    pub fn delete_conversation(&mut self, id: &ConversationId) -> Result<(), ChatError> {
        self.collection.delete_conversation(id)?;
        self.save();
        Ok(())
    }

    pub fn select_conversation(&mut self, id: &ConversationId) -> Result<(), ChatError> {
        self.collection.select_conversation(id)?;
        self.save();
        Ok(())
    }

    pub fn open_turn(&mut self, id: &ConversationId, text: &str) -> Result<MessageId, ChatError> {
        let placeholder_id = self.collection.open_turn(id, text)?;
        self.save();
        Ok(placeholder_id)
    }

    pub fn resolve_turn(
        &mut self,
        id: &ConversationId,
        placeholder_id: &MessageId,
        content: &str,
    ) -> Result<(), ChatError> {
        self.collection.resolve_turn(id, placeholder_id, content)?;
        self.save();
        Ok(())
    }

    pub fn abandon_turn(&mut self, id: &ConversationId, placeholder_id: &MessageId) -> Result<(), ChatError> {
        self.collection.abandon_turn(id, placeholder_id)?;
        self.save();
        Ok(())
    }
}

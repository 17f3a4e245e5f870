pub mod api;
pub mod config;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod segment;
pub mod session;
pub mod storage;
pub mod title;

// Re-export main types for convenience
pub use api::{ApiClient, Generator};
pub use config::Config;
pub use error::{ChatError, GenerateError, StorageError};
pub use normalize::{format_code_blocks, normalize, CodeBlock, CANONICAL_LANGUAGE};
pub use orchestrator::{begin_turn, finish_turn, send, Turn};
pub use segment::{segment, Inline, ProseLine, Segment};
pub use session::{Conversation, ConversationId, Message, MessageId, Sender, SessionCollection, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use title::derive_title;

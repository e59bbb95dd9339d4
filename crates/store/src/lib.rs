//! Storage backends for ReplyForge templates and generation outcomes.
//!
//! Every backend implements both `TemplateStore` and `OutcomeStore` from
//! `replyforge_core`.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

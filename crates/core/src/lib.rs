//! # ReplyForge Core
//!
//! Domain types, traits, and error definitions for the ReplyForge content
//! generation pipeline. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here (backends, template storage,
//! outcome storage, attempt observers). Implementations live in their
//! respective crates, so tests can swap in mocks and the dependency graph
//! points inward on core.

pub mod error;
pub mod intent;
pub mod outcome;
pub mod provider;
pub mod template;
pub mod verdict;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RouterError, StoreError, TemplateError};
pub use intent::{DEFAULT_TEMPLATE_ID, GenerationMetadata, GenerationRequest, ReplyIntent};
pub use outcome::{FALLBACK_PROVIDER, GenerationOutcome, OutcomeStore};
pub use provider::{
    AttemptObserver, GeneratedContent, Provider, ProviderAttempt, ProviderRequest, ProviderTrace,
};
pub use template::{PromptTemplate, TemplateStore, TemplateUpsert};
pub use verdict::{Decision, InjectionVerdict};

//! The ReplyForge generation pipeline.
//!
//! - [`compressor`] — token-budgeted digest of the prior transcript
//! - [`templates`] — versioned prompt templates behind a read-through cache
//! - [`orchestrator`] — screen, compress, render, route, phrase, record

pub mod compressor;
pub mod orchestrator;
pub mod templates;

pub use compressor::{compress, estimate_tokens};
pub use orchestrator::{GenerationOrchestrator, GenerationReport, OrchestratorSettings};
pub use templates::{TemplateRegistry, render_body};

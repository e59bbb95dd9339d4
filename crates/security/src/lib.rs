//! Safety policies for ReplyForge.
//!
//! Provides:
//! - **Injection screen**: allow / sanitize / block classification of inbound text
//! - **Phrasing policy**: URL redaction, disclaimers, tone and length caps on replies

pub mod injection;
pub mod phrasing;

pub use injection::{InjectionScreen, REDACTION_MARKER, ScreenError};
pub use phrasing::{DEFAULT_MAX_CHARS, LINK_MARKER, PhrasingConstraint, parse_constraints};

//! LLM provider backends and the failover router for ReplyForge.
//!
//! All backends implement the `replyforge_core::Provider` trait.
//! [`ProviderRouter`] tries them in configured order.

pub mod anthropic;
pub mod observer;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use observer::TracingObserver;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{DEFAULT_PROVIDER_TIMEOUT, ProviderRouter, build_from_config};

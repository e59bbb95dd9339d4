//! Prompt-injection screening for inbound user text.
//!
//! Two ordered pattern sets are checked, case-insensitively:
//! - **block** patterns (instruction override, secret exfiltration, hidden
//!   configuration disclosure): the first match blocks the text outright.
//! - **sanitize** patterns (safety-policy bypass attempts): every match is
//!   replaced by [`REDACTION_MARKER`] and the redacted text continues.

use regex_lite::Regex;
use replyforge_config::{PatternConfig, ScreenConfig};
use replyforge_core::verdict::InjectionVerdict;

/// Replaces every sanitized span.
pub const REDACTION_MARKER: &str = "[redacted]";

/// A pattern failed to compile.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("invalid screen pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },
}

#[derive(Debug)]
struct NamedPattern {
    name: String,
    regex: Regex,
}

impl NamedPattern {
    fn compile(config: &PatternConfig) -> Result<Self, ScreenError> {
        let regex = Regex::new(&format!("(?i){}", config.pattern)).map_err(|e| {
            ScreenError::InvalidPattern {
                name: config.name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            name: config.name.clone(),
            regex,
        })
    }
}

/// Classifies raw user text before it reaches a template or provider.
///
/// Holds only compiled patterns, so one instance can be shared freely
/// across concurrent turns.
#[derive(Debug)]
pub struct InjectionScreen {
    block: Vec<NamedPattern>,
    sanitize: Vec<NamedPattern>,
}

impl InjectionScreen {
    /// Compile both pattern sets, preserving their order.
    pub fn from_config(config: &ScreenConfig) -> Result<Self, ScreenError> {
        Ok(Self {
            block: compile_all(&config.block_patterns)?,
            sanitize: compile_all(&config.sanitize_patterns)?,
        })
    }

    pub fn evaluate(&self, text: &str) -> InjectionVerdict {
        if let Some(pattern) = self.block.iter().find(|p| p.regex.is_match(text)) {
            return InjectionVerdict::block(format!("blocked:{}", pattern.name));
        }

        let mut redacted = text.to_string();
        let mut matched = Vec::new();
        for pattern in &self.sanitize {
            if pattern.regex.is_match(&redacted) {
                redacted = pattern
                    .regex
                    .replace_all(&redacted, REDACTION_MARKER)
                    .into_owned();
                matched.push(pattern.name.as_str());
            }
        }

        // A pattern that only ever matches the marker itself changes nothing.
        if matched.is_empty() || redacted == text {
            return InjectionVerdict::allow(text);
        }

        InjectionVerdict::sanitize(redacted, format!("sanitized:{}", matched.join(",")))
    }

    pub fn block_pattern_count(&self) -> usize {
        self.block.len()
    }

    pub fn sanitize_pattern_count(&self) -> usize {
        self.sanitize.len()
    }
}

fn compile_all(patterns: &[PatternConfig]) -> Result<Vec<NamedPattern>, ScreenError> {
    patterns.iter().map(NamedPattern::compile).collect()
}

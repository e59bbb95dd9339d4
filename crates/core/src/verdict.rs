//! Injection screening verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The screen's classification of one input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Sanitize,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Sanitize => "sanitize",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "sanitize" => Ok(Self::Sanitize),
            "block" => Ok(Self::Block),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

/// Result of screening one text.
///
/// Constructed only through [`InjectionVerdict::allow`],
/// [`InjectionVerdict::sanitize`] and [`InjectionVerdict::block`], so a block
/// verdict never carries text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionVerdict {
    decision: Decision,
    text: String,
    reason: String,
}

impl InjectionVerdict {
    pub fn allow(text: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            text: text.into(),
            reason: "clean".into(),
        }
    }

    pub fn sanitize(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Sanitize,
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Block,
            text: String::new(),
            reason: reason.into(),
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// The text to continue with; empty for blocked input.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Machine-readable reason code (`clean`, `sanitized:<names>`, `blocked:<name>`).
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Block
    }
}

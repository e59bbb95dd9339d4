//! Output-side phrasing policy: URL redaction, disclaimers, tone, and a hard
//! length cap applied to every reply before it leaves the pipeline.

use regex_lite::Regex;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::warn;

/// Default cap on the final reply, in characters.
pub const DEFAULT_MAX_CHARS: usize = 4096;

/// Replaces every URL when [`PhrasingConstraint::NoUrls`] is set.
pub const LINK_MARKER: &str = "[link removed]";

pub const FINANCIAL_DISCLAIMER: &str =
    "This is general information, not financial advice.";

pub const MEDICAL_DISCLAIMER: &str =
    "This is general information, not medical advice; please consult a qualified professional.";

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|ftp://|www\.)[^\s<>]+").expect("URL pattern compiles")
});

/// A named output constraint.
///
/// Variants are declared in application order; `Ord` follows declaration
/// order so a sorted set applies them deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhrasingConstraint {
    NoUrls,
    NoFinancialAdvice,
    NoMedicalAdvice,
    SafeTone,
}

impl PhrasingConstraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoUrls => "NO_URLS",
            Self::NoFinancialAdvice => "NO_FINANCIAL_ADVICE",
            Self::NoMedicalAdvice => "NO_MEDICAL_ADVICE",
            Self::SafeTone => "SAFE_TONE",
        }
    }
}

impl FromStr for PhrasingConstraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO_URLS" => Ok(Self::NoUrls),
            "NO_FINANCIAL_ADVICE" => Ok(Self::NoFinancialAdvice),
            "NO_MEDICAL_ADVICE" => Ok(Self::NoMedicalAdvice),
            "SAFE_TONE" => Ok(Self::SafeTone),
            other => Err(format!("unknown phrasing constraint '{other}'")),
        }
    }
}

/// Parse constraint names, skipping (and logging) unknown ones.
pub fn parse_constraints<S: AsRef<str>>(names: &[S]) -> Vec<PhrasingConstraint> {
    names
        .iter()
        .filter_map(|name| match name.as_ref().parse() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(constraint = name.as_ref(), "Ignoring phrasing constraint: {e}");
                None
            }
        })
        .collect()
}

/// Apply `constraints` to `text` and cap the result at `max_chars` characters.
///
/// Constraints are deduplicated and applied in declaration order whatever
/// order they are passed in. Disclaimers are appended unconditionally, so
/// running the policy twice over its own output appends them twice.
pub fn apply(text: &str, constraints: &[PhrasingConstraint], max_chars: usize) -> String {
    let ordered: BTreeSet<PhrasingConstraint> = constraints.iter().copied().collect();
    let mut out = text.to_string();

    for constraint in ordered {
        out = match constraint {
            PhrasingConstraint::NoUrls => URL_PATTERN.replace_all(&out, LINK_MARKER).into_owned(),
            PhrasingConstraint::NoFinancialAdvice => append_paragraph(out, FINANCIAL_DISCLAIMER),
            PhrasingConstraint::NoMedicalAdvice => append_paragraph(out, MEDICAL_DISCLAIMER),
            PhrasingConstraint::SafeTone => capitalize_first(&out),
        };
    }

    truncate_chars(out, max_chars)
}

fn append_paragraph(text: String, sentence: &str) -> String {
    if text.trim().is_empty() {
        sentence.to_string()
    } else {
        format!("{}\n\n{sentence}", text.trim_end())
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text,
    }
}

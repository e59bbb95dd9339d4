//! History compression.
//!
//! Reduces a transcript to a digest that fits a token budget: the most
//! recent messages first, then the most salient of the rest. Messages are
//! included whole or not at all.

use std::collections::HashSet;

/// How many trailing messages the recent pass considers.
const RECENT_WINDOW: usize = 4;

const HELP_MARKERS: &[&str] = &["help", "start"];
const RISK_MARKERS: &[&str] = &["policy", "risk"];

/// Estimate tokens for a message: `ceil(words * 1.3)`, never below 1.
///
/// Uses integer arithmetic so the estimate is exact for any word count.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words * 13).div_ceil(10).max(1)
}

/// Compress `messages` into a newline-joined digest whose estimated token
/// count never exceeds `token_budget`.
pub fn compress<S: AsRef<str>>(messages: &[S], token_budget: usize) -> String {
    let normalized: Vec<String> = messages
        .iter()
        .map(|m| normalize(m.as_ref()))
        .filter(|m| !m.is_empty())
        .collect();

    if normalized.is_empty() {
        return String::new();
    }

    let mut chosen: Vec<usize> = Vec::new();
    let mut seen = HashSet::new();
    let mut used = 0usize;

    // Recent pass, oldest of the window first.
    let window_start = normalized.len().saturating_sub(RECENT_WINDOW);
    for idx in window_start..normalized.len() {
        let cost = estimate_tokens(&normalized[idx]);
        if used + cost > token_budget {
            break;
        }
        used += cost;
        chosen.push(idx);
        seen.insert(idx);
    }

    // Salience pass, most salient (then most recent) first.
    let mut ranked: Vec<(u32, usize)> = normalized
        .iter()
        .enumerate()
        .map(|(idx, m)| (salience(m), idx))
        .collect();
    ranked.sort_unstable();

    for &(_, idx) in ranked.iter().rev() {
        if seen.contains(&idx) {
            continue;
        }
        let cost = estimate_tokens(&normalized[idx]);
        if used + cost > token_budget {
            break;
        }
        used += cost;
        chosen.push(idx);
        seen.insert(idx);
    }

    chosen
        .iter()
        .map(|&idx| normalized[idx].as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn salience(message: &str) -> u32 {
    let lower = message.to_lowercase();
    let mut score = 0;
    if message.contains('?') {
        score += 2;
    }
    if message.contains('!') {
        score += 1;
    }
    if HELP_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 3;
    }
    if RISK_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 2;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_tokens(digest: &str) -> usize {
        digest.lines().map(estimate_tokens).sum()
    }

    #[test]
    fn estimate_rounds_up_and_has_floor_of_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("one"), 2);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
        assert_eq!(estimate_tokens("a b c"), 4);
    }

    #[test]
    fn empty_input_gives_empty_digest() {
        assert_eq!(compress::<&str>(&[], 100), "");
        assert_eq!(compress(&["   ", "\n\t"], 100), "");
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(compress(&["  hello   there \n friend "], 100), "hello there friend");
    }

    #[test]
    fn short_history_is_kept_in_order() {
        let history = ["hi", "how are you", "fine thanks"];
        assert_eq!(compress(&history, 100), "hi\nhow are you\nfine thanks");
    }

    #[test]
    fn recent_messages_come_first_then_salient_ones() {
        let history = [
            "can you help me reset my password?",
            "filler one",
            "filler two",
            "filler three",
            "filler four",
            "ok",
        ];
        let digest = compress(&history, 100);
        let lines: Vec<&str> = digest.lines().collect();
        assert_eq!(
            lines,
            [
                "filler two",
                "filler three",
                "filler four",
                "ok",
                "can you help me reset my password?",
                "filler one",
            ]
        );
    }

    #[test]
    fn recent_pass_stops_at_first_overflow() {
        // Window is [big, small, small, small]; big alone exceeds the budget.
        let big = "word ".repeat(20);
        let history = [big.as_str(), "a", "b", "c"];
        let digest = compress(&history, 6);
        // Recent pass adds nothing; salience pass walks c, b, a (equal score, newest first).
        assert_eq!(digest, "c\nb\na");
        assert!(digest_tokens(&digest) <= 6);
    }

    #[test]
    fn salience_prefers_questions_and_markers() {
        let history = [
            "what is your refund policy?",
            "meh",
            "nothing",
            "x1",
            "x2",
            "x3",
            "x4",
        ];
        // Window costs 8, the question costs 7.
        let digest = compress(&history, 15);
        assert!(digest.starts_with("x1\nx2\nx3\nx4"));
        assert!(digest.contains("what is your refund policy?"));
        assert!(!digest.contains("meh"));
    }

    #[test]
    fn zero_budget_yields_empty_digest() {
        assert_eq!(compress(&["hello"], 0), "");
    }

    #[test]
    fn digest_never_exceeds_budget() {
        let history: Vec<String> = (0..30)
            .map(|i| format!("message {i} {}", "lorem ipsum ".repeat(i % 7)))
            .collect();
        for budget in [0, 1, 3, 10, 25, 60, 200] {
            let digest = compress(&history, budget);
            assert!(digest_tokens(&digest) <= budget, "budget {budget}");
        }
    }

    #[test]
    fn messages_are_never_partially_included() {
        let history = ["alpha beta gamma delta", "one"];
        let digest = compress(&history, 4);
        for line in digest.lines() {
            assert!(history.contains(&line));
        }
    }
}

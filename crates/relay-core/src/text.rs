use crate::error::{RelayError, Result};
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Sentinel the agent is instructed to emit when it needs input before it can
/// finish. Everything around it becomes the elicitation body.
pub const CLARIFICATION_MARKER: &str = "[NEEDS_CLARIFICATION]";

/// Upper bound on any activity or comment body sent to the tracker.
pub const MAX_BODY_CHARS: usize = 10_000;

// ---------------------------------------------------------------------------
// Mentions
// ---------------------------------------------------------------------------

/// Rewrites the agent's mention token to plain text in outbound bodies, so the
/// relay's own output cannot read as a fresh mention.
#[derive(Debug, Clone)]
pub struct MentionSanitizer {
    re: Regex,
}

impl MentionSanitizer {
    pub fn new(mention_token: &str) -> Result<Self> {
        let re = RegexBuilder::new(&regex::escape(mention_token))
            .case_insensitive(true)
            .build()
            .map_err(|e| RelayError::Config(format!("invalid mention token: {e}")))?;
        Ok(Self { re })
    }

    /// `@Agent please` -> `Agent please`. The matched casing is kept.
    pub fn sanitize(&self, text: &str) -> String {
        self.re
            .replace_all(text, |caps: &regex::Captures<'_>| {
                caps[0].trim_start_matches('@').to_string()
            })
            .into_owned()
    }
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Cut `text` to at most `max_chars` characters, ending with `…` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

/// First line of `text`, truncated.
pub fn first_line(text: &str, max_chars: usize) -> String {
    truncate(text.lines().next().unwrap_or("").trim(), max_chars)
}

// ---------------------------------------------------------------------------
// Clarification
// ---------------------------------------------------------------------------

/// If `text` contains [`CLARIFICATION_MARKER`], return the elicitation body:
/// the text before and after the marker, trimmed and joined by a blank line.
/// Returns `None` when there is no marker.
pub fn split_clarification(text: &str) -> Option<String> {
    let (before, after) = text.split_once(CLARIFICATION_MARKER)?;
    let after = after.replace(CLARIFICATION_MARKER, "");
    let parts: Vec<&str> = [before.trim(), after.trim()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    Some(parts.join("\n\n"))
}

// ---------------------------------------------------------------------------
// Error text
// ---------------------------------------------------------------------------

static SECRET_RE: OnceLock<Regex> = OnceLock::new();

fn secret_re() -> &'static Regex {
    SECRET_RE.get_or_init(|| {
        Regex::new(r"(?i)(bearer\s+[A-Za-z0-9._\-]+|lin_(?:api|oauth)_[A-Za-z0-9]+|sk-ant-[A-Za-z0-9_\-]+)")
            .unwrap()
    })
}

/// Make an internal error safe to show in the tracker: credentials redacted,
/// length capped.
pub fn sanitize_error(message: &str) -> String {
    let redacted = secret_re().replace_all(message, "[redacted]");
    truncate(redacted.trim(), 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_become_plain_text_in_any_case() {
        let s = MentionSanitizer::new("@agent").unwrap();
        assert_eq!(
            s.sanitize("@agent said: ask @Agent or @AGENT"),
            "agent said: ask Agent or AGENT"
        );
        assert_eq!(s.sanitize("no mention"), "no mention");
    }

    #[test]
    fn mention_token_is_matched_literally() {
        let s = MentionSanitizer::new("@a.b").unwrap();
        assert_eq!(s.sanitize("@a.b @axb"), "a.b @axb");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo wörld", 6), "héllo…");
        assert_eq!(truncate("abcdef", 6), "abcdef");
    }

    #[test]
    fn first_line_drops_the_rest() {
        assert_eq!(first_line("  cargo test\n  --all", 50), "cargo test");
        assert_eq!(first_line("", 50), "");
    }

    #[test]
    fn clarification_marker_is_removed_and_parts_joined() {
        let text = format!("Here's what I found:\n\n{CLARIFICATION_MARKER}\n\nI have questions.");
        assert_eq!(
            split_clarification(&text).as_deref(),
            Some("Here's what I found:\n\nI have questions.")
        );
    }

    #[test]
    fn clarification_with_empty_preamble() {
        let text = format!("{CLARIFICATION_MARKER} Which branch?");
        assert_eq!(split_clarification(&text).as_deref(), Some("Which branch?"));
    }

    #[test]
    fn text_without_marker_is_not_a_clarification() {
        assert_eq!(split_clarification("Fixed in commit abc"), None);
    }

    #[test]
    fn errors_are_redacted() {
        let msg = "request failed: Authorization: Bearer lin_api_abc123 rejected";
        let clean = sanitize_error(msg);
        assert!(!clean.contains("lin_api_abc123"));
        assert!(clean.contains("[redacted]"));
    }
}

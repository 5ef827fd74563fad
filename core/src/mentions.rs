use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// `@handle` pattern: the `@` must sit at the start of the text or after a
/// non-word character, so the local part of an email address
/// (`user@example.com`) is never treated as a mention.
const MENTION_PATTERN: &str = r"(?:^|[^A-Za-z0-9_])@([A-Za-z0-9_-]{1,32})";

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MENTION_PATTERN).expect("mention pattern must compile"))
}

/// Extract the set of @-mentioned handles from comment text.
///
/// Handles are 1–32 characters of `[A-Za-z0-9_-]`, deduplicated
/// case-sensitively. Extraction order is irrelevant — callers treat the
/// result as a set.
pub fn extract_mentions(text: &str) -> BTreeSet<String> {
    mention_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(handles: &[&str]) -> BTreeSet<String> {
        handles.iter().map(|h| (*h).to_string()).collect()
    }

    #[test]
    fn extracts_handles_at_start_and_after_boundaries() {
        assert_eq!(extract_mentions("@alice hi"), set(&["alice"]));
        assert_eq!(extract_mentions("hello @bob"), set(&["bob"]));
        assert_eq!(extract_mentions("(@carol), @dave!"), set(&["carol", "dave"]));
    }

    #[test]
    fn skips_email_local_parts() {
        assert_eq!(extract_mentions("mail me at user@example.com"), set(&[]));
        assert_eq!(
            extract_mentions("cc user@example.com and @ops"),
            set(&["ops"])
        );
    }

    #[test]
    fn dedup_is_case_sensitive() {
        assert_eq!(
            extract_mentions("@Alice @alice @Alice"),
            set(&["Alice", "alice"])
        );
    }

    #[test]
    fn ignores_bare_at_and_empty_text() {
        assert_eq!(extract_mentions("@ nothing"), set(&[]));
        assert_eq!(extract_mentions(""), set(&[]));
    }

    #[test]
    fn allows_underscore_and_dash() {
        assert_eq!(
            extract_mentions("ping @build_bot-2"),
            set(&["build_bot-2"])
        );
    }
}

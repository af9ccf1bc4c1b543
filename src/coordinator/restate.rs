//! First-person to third-person restatement.
//!
//! Applied only on the path into the knowledge graph (see
//! [`super::MemoryCoordinator::store_user_memory`]); the literal,
//! first-person text always stays in the local semantic store.

use once_cell::sync::Lazy;
use regex::Regex;

static MY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^my\b").unwrap());
static I_AM_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^i\s+am\b").unwrap());
static I_HAVE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^i\s+have\b").unwrap());
static I_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^i\b").unwrap());

/// Rewrites a first-person statement about the user into a third-person
/// statement naming `user_id`, preserving everything after the rewritten
/// prefix verbatim. Idempotent: `restate(restate(text), user_id) ==
/// restate(text, user_id)`.
#[must_use]
pub fn restate(text: &str, user_id: &str) -> String {
    if text.starts_with(user_id) {
        // Already restated (or happens to already name the user) — leave
        // it alone so a second pass is a no-op.
        return text.to_string();
    }
    if let Some(rest) = strip_prefix(&MY_PATTERN, text) {
        return format!("{user_id}'s {rest}");
    }
    if let Some(rest) = strip_prefix(&I_AM_PATTERN, text) {
        return format!("{user_id} is {rest}");
    }
    if let Some(rest) = strip_prefix(&I_HAVE_PATTERN, text) {
        return format!("{user_id} has {rest}");
    }
    if let Some(rest) = strip_prefix(&I_PATTERN, text) {
        return format!("{user_id} {rest}");
    }
    text.to_string()
}

fn strip_prefix(pattern: &Regex, text: &str) -> Option<String> {
    let m = pattern.find(text)?;
    Some(text[m.end()..].trim_start().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_i_am() {
        assert_eq!(restate("I am a software engineer.", "alice"), "alice is a software engineer.");
    }

    #[test]
    fn rewrites_my() {
        assert_eq!(restate("My favorite color is blue.", "alice"), "alice's favorite color is blue.");
    }

    #[test]
    fn rewrites_i_have() {
        assert_eq!(restate("I have two cats.", "alice"), "alice has two cats.");
    }

    #[test]
    fn rewrites_bare_i() {
        assert_eq!(restate("I love hiking.", "alice"), "alice love hiking.");
    }

    #[test]
    fn leaves_unrelated_text_unchanged() {
        assert_eq!(restate("Paris is the capital of France.", "alice"), "Paris is the capital of France.");
    }

    #[test]
    fn is_idempotent() {
        let once = restate("I live in Paris.", "alice");
        let twice = restate(&once, "alice");
        assert_eq!(once, twice);
    }
}

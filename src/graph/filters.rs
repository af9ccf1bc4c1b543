//! Pure, non-networked filters over an already-fetched document list.

use super::GraphDocument;
use super::DocumentStatus;

/// Keeps only documents whose `status` equals `status`.
#[must_use]
pub fn filter_by_status(docs: &[GraphDocument], status: DocumentStatus) -> Vec<GraphDocument> {
    docs.iter().filter(|d| d.status == status).cloned().collect()
}

/// Keeps only documents whose id is in `ids`.
#[must_use]
pub fn filter_by_ids(docs: &[GraphDocument], ids: &[String]) -> Vec<GraphDocument> {
    docs.iter().filter(|d| ids.contains(&d.id)).cloned().collect()
}

/// Keeps only documents whose `file_path` matches a simple glob pattern
/// (`*` and `?` wildcards, no character classes).
#[must_use]
pub fn filter_by_name_pattern(docs: &[GraphDocument], pattern: &str) -> Vec<GraphDocument> {
    docs.iter()
        .filter(|d| glob_match(pattern, &d.file_path))
        .cloned()
        .collect()
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), text.as_bytes())
}

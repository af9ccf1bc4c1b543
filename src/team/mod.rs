//! Optional multi-agent delegation layer, active when
//! [`crate::config::AgentMode::Team`] is selected.
//!
//! A [`TeamCoordinator`] holds an ordered list of specialist
//! [`AgentRuntime`]s, each pinned to its own tool subset and role
//! instructions, and routes a single incoming query to exactly one
//! member by keyword classification of the query text. Specialist
//! results are passed through unchanged — the coordinator never
//! reinterprets them.

use crate::agent::AgentRuntime;
use crate::llm::ChatMessage;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

/// The nine specialist roles a query can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Memory,
    Web,
    Finance,
    Calculator,
    Image,
    Python,
    File,
    System,
    Medical,
}

impl Intent {
    /// Human-readable label used in delegation results and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Web => "web",
            Self::Finance => "finance",
            Self::Calculator => "calculator",
            Self::Image => "image",
            Self::Python => "python",
            Self::File => "file",
            Self::System => "system",
            Self::Medical => "medical",
        }
    }
}

static MEMORY_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(remember|recall|my name|what did i|preference|forget)\b").unwrap());
static WEB_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(search|latest news|look up|google|browse|website)\b").unwrap());
static FINANCE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(stock|price|portfolio|invest|market cap|ticker)\b").unwrap());
static CALCULATOR_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(calculate|sum|average|percent|square root|[0-9]+\s*[+\-*/]\s*[0-9]+)\b").unwrap());
static IMAGE_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(draw|generate an image|picture of|illustration)\b").unwrap());
static PYTHON_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(run this code|python script|execute code)\b").unwrap());
static FILE_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(read file|write file|open the file|save to disk)\b").unwrap());
static SYSTEM_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(run command|shell|terminal|ls |ps aux)\b").unwrap());
static MEDICAL_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(symptom|diagnosis|medication|dosage|doctor)\b").unwrap());

/// Classifies `query` into one [`Intent`], falling back to
/// [`Intent::Memory`] (the coordinator's default specialist) when no
/// keyword class matches.
#[must_use]
pub fn classify(query: &str) -> Intent {
    let table: [(&Lazy<Regex>, Intent); 9] = [
        (&MEDICAL_WORDS, Intent::Medical),
        (&FINANCE_WORDS, Intent::Finance),
        (&CALCULATOR_WORDS, Intent::Calculator),
        (&IMAGE_WORDS, Intent::Image),
        (&PYTHON_WORDS, Intent::Python),
        (&FILE_WORDS, Intent::File),
        (&SYSTEM_WORDS, Intent::System),
        (&WEB_WORDS, Intent::Web),
        (&MEMORY_WORDS, Intent::Memory),
    ];
    for (pattern, intent) in table {
        if pattern.is_match(query) {
            return intent;
        }
    }
    Intent::Memory
}

/// One named specialist: the intent it serves plus its independent
/// agent runtime.
pub struct Specialist {
    pub intent: Intent,
    pub runtime: AgentRuntime,
    pub system_prompt: String,
}

/// Result of delegating one query to a specialist, passed through
/// unchanged from the specialist's own [`crate::agent::AgentResult`].
pub struct DelegationResult {
    pub intent: Intent,
    pub content: String,
}

/// Ordered list of specialist agents plus intent-based routing.
pub struct TeamCoordinator {
    members: Vec<Specialist>,
}

impl TeamCoordinator {
    #[must_use]
    pub fn new(members: Vec<Specialist>) -> Self {
        Self { members }
    }

    /// Routes `query` to exactly one specialist by keyword
    /// classification and runs it to completion. Fails with
    /// [`Error::NotFound`] if no specialist is registered for the
    /// classified intent (the coordinator never falls back to a
    /// different member than the one the query was routed to).
    pub async fn delegate(
        &self,
        history: &[ChatMessage],
        query: &str,
        cancel: CancellationToken,
    ) -> Result<DelegationResult> {
        let intent = classify(query);
        let specialist = self
            .members
            .iter()
            .find(|m| m.intent == intent)
            .ok_or_else(|| Error::NotFound(format!("no specialist registered for intent: {}", intent.label())))?;

        let result = specialist.runtime.run(&specialist.system_prompt, history, query, cancel).await?;
        Ok(DelegationResult { intent, content: result.final_content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_memory_query() {
        assert_eq!(classify("can you remember my birthday?"), Intent::Memory);
    }

    #[test]
    fn classifies_finance_query() {
        assert_eq!(classify("what's the stock price of ACME today?"), Intent::Finance);
    }

    #[test]
    fn classifies_calculator_query() {
        assert_eq!(classify("calculate the average of these numbers"), Intent::Calculator);
    }

    #[test]
    fn unrecognized_query_falls_back_to_memory() {
        assert_eq!(classify("tell me something interesting"), Intent::Memory);
    }

    #[test]
    fn medical_takes_priority_over_generic_overlap() {
        assert_eq!(classify("what dosage of medication should I take?"), Intent::Medical);
    }
}

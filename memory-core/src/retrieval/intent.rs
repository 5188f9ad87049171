//! Lightweight keyword-based intent detection: routes a free-form query
//! to one of `how | what | why` without an LLM call.

use crate::model::Collection;

/// The detected retrieval intent, mapped to a primary collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// "how do we..." → `code-patterns`.
    How,
    /// "what rule/convention..." → `conventions`.
    What,
    /// "why did we..." → `discussions`.
    Why,
}

impl Intent {
    /// The collection this intent searches first.
    #[must_use]
    pub fn primary_collection(self) -> Collection {
        match self {
            Intent::How => Collection::CodePatterns,
            Intent::What => Collection::Conventions,
            Intent::Why => Collection::Discussions,
        }
    }
}

const WHY_MARKERS: &[&str] = &["why did we", "why do we", "rationale", "what was the reason"];
const WHAT_MARKERS: &[&str] = &["what rule", "what convention", "what's the standard", "what is the standard"];
const HOW_MARKERS: &[&str] = &["how do we", "how should i", "how to", "best way to"];

/// Detect intent from keyword markers; defaults to [`Intent::How`] when
/// nothing matches, since most queries during active coding ask "how".
#[must_use]
pub fn detect(query: &str) -> Intent {
    let lower = query.to_lowercase();
    if WHY_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::Why
    } else if WHAT_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::What
    } else if HOW_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::How
    } else {
        Intent::How
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_why_intent() {
        assert_eq!(detect("why did we choose postgres"), Intent::Why);
    }

    #[test]
    fn detects_what_intent() {
        assert_eq!(detect("what convention do we use for naming"), Intent::What);
    }

    #[test]
    fn detects_how_intent() {
        assert_eq!(detect("how do we refresh JWTs"), Intent::How);
    }

    #[test]
    fn defaults_to_how_when_unmatched() {
        assert_eq!(detect("jwt refresh token rotation"), Intent::How);
    }
}

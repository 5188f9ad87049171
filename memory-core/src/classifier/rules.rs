//! Terminal deterministic regex fallback, used when every provider in
//! the chain is unavailable.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::MemoryType;

struct Rule {
    pattern: &'static LazyLock<Regex>,
    memory_type: MemoryType,
}

static PORT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bport\s+\d{2,5}\b").unwrap());
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(traceback|exception|error:|panicked at)\b").unwrap());
static DECISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwe (decided|chose|agreed) to\b").unwrap());
static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(must|always|never) (use|do|avoid)\b").unwrap());
static NAMING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bname(d|s|ing)? (files?|functions?|variables?)\b").unwrap());

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            pattern: &PORT_RE,
            memory_type: MemoryType::Port,
        },
        Rule {
            pattern: &ERROR_RE,
            memory_type: MemoryType::ErrorFix,
        },
        Rule {
            pattern: &DECISION_RE,
            memory_type: MemoryType::Decision,
        },
        Rule {
            pattern: &RULE_RE,
            memory_type: MemoryType::Rule,
        },
        Rule {
            pattern: &NAMING_RE,
            memory_type: MemoryType::Naming,
        },
    ]
});

/// Classify `content` using the deterministic regex rules. Returns
/// `None` if nothing matches; callers fall back to
/// [`crate::model::MemoryType::Context`] in that case.
#[must_use]
pub fn classify(content: &str) -> Option<MemoryType> {
    RULES
        .iter()
        .find(|rule| rule.pattern.is_match(content))
        .map(|rule| rule.memory_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_port_mentions() {
        assert_eq!(classify("the API listens on port 8080"), Some(MemoryType::Port));
    }

    #[test]
    fn matches_error_traces() {
        assert_eq!(
            classify("Traceback (most recent call last):\n  raise ValueError"),
            Some(MemoryType::ErrorFix)
        );
    }

    #[test]
    fn matches_decision_language() {
        assert_eq!(
            classify("we decided to use redis for caching"),
            Some(MemoryType::Decision)
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(classify("just a plain sentence"), None);
    }
}

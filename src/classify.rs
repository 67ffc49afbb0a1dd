//! Decide whether a failed transactional attempt is worth retrying.
//!
//! The Data Plane API reports "someone else changed the configuration underneath you" through
//! several different error shapes. All of them are listed in [`RETRYABLE_RULES`]; everything
//! that matches none of the rules is fatal.

use crate::errors::{Error, ErrorKind};

/// Outcome of classifying an error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Retryability {
    Retryable,
    Fatal,
}

/// One recognized retryable condition.
#[derive(Debug)]
pub struct RetryRule {
    /// Short name used in logs.
    pub name: &'static str,
    /// Error kinds this rule may match.
    pub kinds: &'static [ErrorKind],
    /// Substrings that must all appear, compared case-insensitively.
    pub all_of: &'static [&'static str],
}

impl RetryRule {
    fn matches(&self, kind: ErrorKind, text: &str) -> bool {
        self.kinds.contains(&kind) && self.all_of.iter().all(|needle| text.contains(needle))
    }
}

const REMOTE: &[ErrorKind] = &[ErrorKind::Api, ErrorKind::Transport];

pub const RETRYABLE_RULES: &[RetryRule] = &[
    RetryRule {
        name: "transaction outdated",
        kinds: REMOTE,
        all_of: &["transaction", "outdated"],
    },
    RetryRule {
        name: "transaction does not exist",
        kinds: REMOTE,
        all_of: &["transaction", "does not exist"],
    },
    RetryRule {
        name: "version mismatch",
        kinds: REMOTE,
        all_of: &["version mismatch"],
    },
    RetryRule {
        name: "version or transaction not specified",
        kinds: REMOTE,
        all_of: &["version or transaction not specified"],
    },
    // Seen when a concurrent commit rewrites the defaults section while our transaction is being
    // validated. Looks like a server race rather than a real config error.
    RetryRule {
        name: "transient defaults validation",
        kinds: &[ErrorKind::Api],
        all_of: &["validation error", "defaults section"],
    },
];

/// Find the rule that makes `err` retryable, if any.
pub fn matching_rule(err: &Error) -> Option<&'static RetryRule> {
    let kind = err.kind();
    let text = err.diagnostic_text().to_lowercase();
    RETRYABLE_RULES.iter().find(|rule| rule.matches(kind, &text))
}

/// Classify an error as retryable or fatal.
pub fn classify(err: &Error) -> Retryability {
    match matching_rule(err) {
        Some(_) => Retryability::Retryable,
        None => Retryability::Fatal,
    }
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        classify(self) == Retryability::Retryable
    }
}

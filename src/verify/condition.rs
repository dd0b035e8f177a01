//! Comparator grammar for verification criteria.
//!
//! `>N`, `<N`, `>=N`, `<=N`, `!=N`, or a bare `N` for numeric equality.
//! When either side is not numeric the check falls back to
//! case-insensitive string equality against the raw expectation.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,
    #[error("'{0}' is not a numeric operand")]
    InvalidOperand(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    Gt(f64),
    Lt(f64),
    Ge(f64),
    Le(f64),
    Ne(f64),
    Eq(f64),
}

impl Condition {
    pub fn holds(&self, actual: f64) -> bool {
        match *self {
            Condition::Gt(t) => actual > t,
            Condition::Lt(t) => actual < t,
            Condition::Ge(t) => actual >= t,
            Condition::Le(t) => actual <= t,
            Condition::Ne(t) => actual != t,
            Condition::Eq(t) => actual == t,
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConditionError::Empty);
        }

        // Two-character operators must be tried before their one-character prefixes.
        type Ctor = fn(f64) -> Condition;
        let (ctor, operand): (Ctor, &str) = if let Some(rest) = s.strip_prefix(">=") {
            (Condition::Ge, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (Condition::Le, rest)
        } else if let Some(rest) = s.strip_prefix("!=") {
            (Condition::Ne, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (Condition::Gt, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (Condition::Lt, rest)
        } else {
            (Condition::Eq, s)
        };

        operand
            .trim()
            .parse::<f64>()
            .map(ctor)
            .map_err(|_| ConditionError::InvalidOperand(operand.trim().to_string()))
    }
}

/// Whether `actual` satisfies `expected`.
pub fn evaluate(actual: &str, expected: &str) -> bool {
    match (actual.trim().parse::<f64>(), expected.parse::<Condition>()) {
        (Ok(value), Ok(condition)) => condition.holds(value),
        _ => actual.trim().eq_ignore_ascii_case(expected.trim()),
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionKeyError {
    #[error("invalid option key: {0:?}")]
    Invalid(String),
}

//
// ─── NORMALIZATION ────────────────────────────────────────────────────────────
//

/// Canonical form of a stored or submitted answer key.
///
/// Parentheses and whitespace are dropped and the rest is uppercased, so
/// `"(c)"`, `" C "` and `"c"` all become `"C"`.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '(' | ')') && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

//
// ─── OPTION KEY ───────────────────────────────────────────────────────────────
//

/// One of the four multiple-choice options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    /// Parses a key after normalization.
    ///
    /// # Errors
    ///
    /// Returns `OptionKeyError::Invalid` unless the normalized input is `A`–`D`.
    pub fn parse(raw: &str) -> Result<Self, OptionKeyError> {
        match normalize_key(raw).as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(OptionKeyError::Invalid(raw.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
        }
    }

    /// Zero-based position of the option (A = 0).
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            OptionKey::A => 0,
            OptionKey::B => 1,
            OptionKey::C => 2,
            OptionKey::D => 3,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = OptionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//
// ─── ANSWER CHOICE ────────────────────────────────────────────────────────────
//

/// What the user ended up with for a question at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerChoice {
    Chosen(OptionKey),
    Unattempted,
}

impl AnswerChoice {
    pub const UNATTEMPTED: &'static str = "UNATTEMPTED";

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerChoice::Chosen(key) => key.as_str(),
            AnswerChoice::Unattempted => Self::UNATTEMPTED,
        }
    }

    /// Reads a persisted choice. Anything that is not a valid key counts as
    /// unattempted, matching how stored rows are reviewed.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(|value| OptionKey::parse(value).ok())
            .map_or(AnswerChoice::Unattempted, AnswerChoice::Chosen)
    }

    #[must_use]
    pub fn key(self) -> Option<OptionKey> {
        match self {
            AnswerChoice::Chosen(key) => Some(key),
            AnswerChoice::Unattempted => None,
        }
    }

    #[must_use]
    pub fn is_attempted(self) -> bool {
        matches!(self, AnswerChoice::Chosen(_))
    }
}

impl From<Option<OptionKey>> for AnswerChoice {
    fn from(value: Option<OptionKey>) -> Self {
        value.map_or(AnswerChoice::Unattempted, AnswerChoice::Chosen)
    }
}

impl fmt::Display for AnswerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

//! Scope sets and their algebra.
//!
//! A scope is a space-separated list of tokens. Each token is a run of
//! visible ASCII characters other than `"` and `\`. Sets are kept sorted so
//! the string form is canonical and can be compared byte-for-byte.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Scope parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("empty scope token")]
    EmptyToken,

    #[error("malformed scope token: {0:?}")]
    MalformedToken(String),
}

/// An ordered-unique set of scope tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScopeSet {
    tokens: BTreeSet<String>,
}

/// Whether `c` is allowed in a scope token (`%x21 / %x23-5B / %x5D-7E`).
fn is_scope_char(c: char) -> bool {
    matches!(c, '!' | '#'..='[' | ']'..='~')
}

impl ScopeSet {
    /// The empty scope.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a space-separated scope string.
    ///
    /// The empty string is the empty set. Tokens are separated by exactly one
    /// space, so leading, trailing or doubled spaces are rejected.
    pub fn parse(s: &str) -> Result<Self, ScopeError> {
        if s.is_empty() {
            return Ok(Self::empty());
        }
        let mut tokens = BTreeSet::new();
        for token in s.split(' ') {
            if token.is_empty() {
                return Err(ScopeError::EmptyToken);
            }
            if !token.chars().all(is_scope_char) {
                return Err(ScopeError::MalformedToken(token.to_string()));
            }
            tokens.insert(token.to_string());
        }
        Ok(Self { tokens })
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// True when every token of `self` is in `other`. The empty set is a
    /// subset of every set, including another empty set.
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.tokens.is_subset(&other.tokens)
    }

    /// Union of both sets.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet {
            tokens: self.tokens.union(&other.tokens).cloned().collect(),
        }
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in &self.tokens {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(token)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for ScopeSet {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ScopeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ScopeSet::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(s: &str) -> ScopeSet {
        ScopeSet::parse(s).unwrap()
    }

    #[test]
    fn parse_sorts_and_deduplicates() {
        let s = scope("write read write");
        assert_eq!(s.len(), 2);
        assert_eq!(s.to_string(), "read write");
    }

    #[test]
    fn empty_string_is_empty_set() {
        assert!(scope("").is_empty());
        assert_eq!(scope("").to_string(), "");
    }

    #[test]
    fn canonical_form_round_trips() {
        for raw in ["foo bar baz", "b a", "x", "", "http://example.org/scope urn:x:y"] {
            let parsed = scope(raw);
            assert_eq!(ScopeSet::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn rejects_empty_tokens() {
        assert_eq!(ScopeSet::parse("a  b"), Err(ScopeError::EmptyToken));
        assert_eq!(ScopeSet::parse(" a"), Err(ScopeError::EmptyToken));
        assert_eq!(ScopeSet::parse("a "), Err(ScopeError::EmptyToken));
    }

    #[test]
    fn rejects_characters_outside_grammar() {
        assert!(matches!(
            ScopeSet::parse("a\"b"),
            Err(ScopeError::MalformedToken(_))
        ));
        assert!(ScopeSet::parse("a\\b").is_err());
        assert!(ScopeSet::parse("tab\there").is_err());
        assert!(ScopeSet::parse("ünïcode").is_err());
        assert!(ScopeSet::parse("!#[]~").is_ok());
    }

    #[test]
    fn empty_set_is_subset_of_everything() {
        let empty = ScopeSet::empty();
        assert!(empty.is_subset_of(&empty));
        assert!(empty.is_subset_of(&scope("read")));
    }

    #[test]
    fn subset_checks_every_token() {
        assert!(scope("read").is_subset_of(&scope("read write")));
        assert!(scope("write read").is_subset_of(&scope("read write")));
        assert!(!scope("read admin").is_subset_of(&scope("read write")));
        assert!(!scope("read").is_subset_of(&ScopeSet::empty()));
    }

    #[test]
    fn union_merges_tokens() {
        assert_eq!(
            scope("a c").union(&scope("b c")).to_string(),
            "a b c".to_string()
        );
    }

    #[test]
    fn serde_uses_canonical_string() {
        let json = serde_json::to_string(&scope("b a")).unwrap();
        assert_eq!(json, "\"a b\"");
        let back: ScopeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scope("a b"));
        assert!(serde_json::from_str::<ScopeSet>("\"a  b\"").is_err());
    }
}

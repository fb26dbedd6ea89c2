//! Tags: the `(key, value)` pairs that scope consistency boundaries.
//!
//! A tag attaches a queryable attribute to an event, e.g. `wallet=w1` or
//! `account=abc-123`. Tags are the unit of scoping for conflict detection:
//! a conditional append on `wallet=w1` never conflicts with events tagged
//! only `wallet=w2`.
//!
//! # Wire form
//!
//! A tag serializes as `"key=value"`. Keys are lowercase identifiers
//! (`[a-z][a-z0-9_]*`); values are opaque UTF-8 and may contain `=`.
//!
//! # Examples
//!
//! ```
//! use dcb_core::tag::Tag;
//!
//! let tag = Tag::new("wallet", "w1").unwrap();
//! assert_eq!(tag.to_string(), "wallet=w1");
//!
//! let parsed: Tag = "wallet=w1".parse().unwrap();
//! assert_eq!(parsed, tag);
//! ```

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from tag construction or parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The key is empty.
    #[error("Tag key cannot be empty")]
    EmptyKey,

    /// The value is empty.
    #[error("Tag value cannot be empty")]
    EmptyValue,

    /// The key is not a lowercase identifier.
    #[error("Invalid tag key '{0}': expected lowercase identifier ([a-z][a-z0-9_]*)")]
    InvalidKey(String),

    /// The wire form is missing the `=` separator.
    #[error("Malformed tag '{0}': expected \"key=value\"")]
    Malformed(String),
}

/// An ordered `(key, value)` pair attached to an event.
///
/// Tags are set-semantic on an event: storing the same tag twice is a no-op.
/// Both fields are validated at construction, so a `Tag` value is always
/// well-formed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Create a validated tag.
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] if the key is empty or not a lowercase
    /// identifier, or if the value is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use dcb_core::tag::Tag;
    ///
    /// let tag = Tag::new("wallet", "w1").unwrap();
    /// assert_eq!(tag.key(), "wallet");
    /// assert_eq!(tag.value(), "w1");
    ///
    /// assert!(Tag::new("Wallet", "w1").is_err()); // uppercase key
    /// assert!(Tag::new("wallet", "").is_err()); // empty value
    /// ```
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, TagError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(TagError::EmptyKey);
        }
        if !is_valid_key(&key) {
            return Err(TagError::InvalidKey(key));
        }
        if value.is_empty() {
            return Err(TagError::EmptyValue);
        }

        Ok(Self { key, value })
    }

    /// Get the tag key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the tag value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl FromStr for Tag {
    type Err = TagError;

    /// Parse the `"key=value"` wire form. The value may itself contain `=`;
    /// only the first separator splits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| TagError::Malformed(s.to_string()))?;
        Self::new(key, value)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = Tag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tag in \"key=value\" form")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Tag, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn valid_tag_roundtrips_through_wire_form() {
        let tag = Tag::new("wallet", "w1").unwrap();
        let parsed: Tag = tag.to_string().parse().unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn value_may_contain_separator() {
        let tag: Tag = "meta=a=b".parse().unwrap();
        assert_eq!(tag.key(), "meta");
        assert_eq!(tag.value(), "a=b");
    }

    #[test]
    fn rejects_empty_key() {
        assert_eq!(Tag::new("", "v"), Err(TagError::EmptyKey));
    }

    #[test]
    fn rejects_empty_value() {
        assert_eq!(Tag::new("k", ""), Err(TagError::EmptyValue));
        assert!(matches!("k=".parse::<Tag>(), Err(TagError::EmptyValue)));
    }

    #[test]
    fn rejects_non_identifier_keys() {
        assert!(matches!(Tag::new("Wallet", "w1"), Err(TagError::InvalidKey(_))));
        assert!(matches!(Tag::new("9lives", "x"), Err(TagError::InvalidKey(_))));
        assert!(matches!(Tag::new("a-b", "x"), Err(TagError::InvalidKey(_))));
        assert!(Tag::new("a_b2", "x").is_ok());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!("wallet".parse::<Tag>(), Err(TagError::Malformed(_))));
    }

    #[test]
    fn ordering_is_by_key_then_value() {
        let a = Tag::new("a", "2").unwrap();
        let b = Tag::new("a", "10").unwrap();
        let c = Tag::new("b", "1").unwrap();
        assert!(b < a); // lexicographic on value
        assert!(a < c);
    }
}

//! Routing slug type.
//!
//! A routing slug is the short random string that masks the administrative
//! URL namespace. It is rotated on every login and a stale value is only
//! ever a redirect target away from the current one.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`RoutingSlug`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum SlugError {
    /// The input has the wrong length.
    #[error("routing slug must be exactly {expected} characters")]
    WrongLength {
        /// Required length.
        expected: usize,
    },
    /// The input contains a character outside `[0-9a-z]`.
    #[error("routing slug must be lowercase alphanumeric")]
    InvalidCharacter,
}

/// A rotating random identifier embedded in the admin URL namespace.
///
/// Valid only while it matches the value stored on the identity's profile
/// record. Never reused: every successful login mints a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoutingSlug(String);

impl RoutingSlug {
    /// Fixed slug length.
    pub const LENGTH: usize = 8;

    /// Parse a `RoutingSlug` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly [`Self::LENGTH`]
    /// lowercase alphanumeric ASCII characters.
    pub fn parse(s: &str) -> Result<Self, SlugError> {
        if s.len() != Self::LENGTH {
            return Err(SlugError::WrongLength {
                expected: Self::LENGTH,
            });
        }

        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(SlugError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Get the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RoutingSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let slug = RoutingSlug::parse("k3v9x2aq").unwrap();
        assert_eq!(slug.as_str(), "k3v9x2aq");
    }

    #[test]
    fn test_parse_wrong_length() {
        assert!(matches!(
            RoutingSlug::parse("short"),
            Err(SlugError::WrongLength { expected: 8 })
        ));
        assert!(matches!(
            RoutingSlug::parse("waytoolongslug"),
            Err(SlugError::WrongLength { expected: 8 })
        ));
    }

    #[test]
    fn test_parse_rejects_uppercase_and_symbols() {
        assert!(matches!(
            RoutingSlug::parse("K3V9X2AQ"),
            Err(SlugError::InvalidCharacter)
        ));
        assert!(matches!(
            RoutingSlug::parse("k3v9x2a!"),
            Err(SlugError::InvalidCharacter)
        ));
    }
}

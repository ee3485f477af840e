//! Opaque session token type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// An opaque per-device session token.
///
/// Minted by the session authority on login, handed to the client for
/// device-local storage, and compared against the most recent active
/// session row on every revalidation. The value itself carries no
/// structure; equality is the only meaningful operation.
///
/// `Debug` redacts the value so tokens never end up in logs.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap an existing token value.
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&"[REDACTED]").finish()
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_value() {
        let token = SessionToken::new("super-secret-token".to_owned());
        let debug = format!("{token:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn test_equality() {
        let a = SessionToken::from("abc");
        let b = SessionToken::from("abc");
        let c = SessionToken::from("xyz");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

//! Opaque credential handle supplied by the authentication layer.
//!
//! Token acquisition and refresh happen outside this crate; the core only
//! ever checks whether a token is present before making a network call.

use std::fmt;

/// An access token for the Graph API, or nothing at all.
///
/// An anonymous credential is valid input everywhere: operations that can be
/// satisfied from the local cache succeed, operations that would need the
/// network fail with `NeedCredential`.
#[derive(Clone, Default)]
pub struct Credential {
    access_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// A credential with no token, for cache-only operation.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn has_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never log token material
        f.debug_struct("Credential")
            .field("access_token", &if self.has_token() { "<present>" } else { "<absent>" })
            .finish()
    }
}

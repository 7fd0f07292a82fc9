//! Transport-agnostic credential check for the stats read path.
//!
//! Header parsing is transport-specific. This module only verifies a
//! username/password pair against the configured values.

use subtle::ConstantTimeEq;

/// HTTP Basic credentials for reading aggregated stats.
#[derive(Clone)]
pub struct AuthProvider {
    basic_user: String,
    basic_password: String,
}

impl std::fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProvider")
            .field("basic_user", &self.basic_user)
            .field("basic_password", &"<redacted>")
            .finish()
    }
}

impl AuthProvider {
    /// Creates a provider when both a username and a password are configured.
    /// Returns `None` otherwise; callers must then deny every read.
    pub fn new(user: Option<String>, password: Option<String>) -> Option<Self> {
        match (user, password) {
            (Some(basic_user), Some(basic_password)) if !basic_user.is_empty() => Some(Self {
                basic_user,
                basic_password,
            }),
            _ => None,
        }
    }

    /// Check basic auth credentials.
    pub fn check_basic(&self, user: &str, password: &str) -> bool {
        // Evaluate both halves so timing does not reveal which one failed.
        let user_ok = ct_eq(user.as_bytes(), self.basic_user.as_bytes());
        let pass_ok = ct_eq(password.as_bytes(), self.basic_password.as_bytes());
        user_ok & pass_ok
    }
}

/// Constant-time comparison of two byte slices.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

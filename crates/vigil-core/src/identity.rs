//! Caller identity.
//!
//! Authentication itself happens outside the pipeline; this is only the
//! resolved result that rides along in the [`RequestContext`](crate::RequestContext).

use serde::{Deserialize, Serialize};

/// An authenticated end user.
///
/// # Example
///
/// ```rust
/// use vigil_core::UserIdentity;
///
/// let identity = UserIdentity::new("u123").with_roles(["admin"]);
/// assert_eq!(identity.log_id(), "user:u123");
/// assert!(identity.has_role("admin"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub user_id: String,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserIdentity {
    /// Creates an identity without roles.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
        }
    }

    /// Replaces the roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("user:{}", self.user_id)
    }

    /// Returns `true` if the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

//! Authenticated caller and permission levels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identity::DocId;

/// Role that overrides ownership checks.
pub const ADMIN_ROLE: &str = "admin";

/// Permission level attached to a service or an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Anyone, including anonymous callers.
    Public,
    /// Any authenticated caller.
    #[serde(rename = "LOGGEDIN")]
    LoggedIn,
    /// The owner of the resolved model, or an admin.
    Owner,
    /// Admins only.
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Public => "PUBLIC",
            Permission::LoggedIn => "LOGGEDIN",
            Permission::Owner => "OWNER",
            Permission::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    /// Accepts `PUBLIC`, `LOGGEDIN`, `OWNER`, `ADMIN`, optionally prefixed
    /// with `PERM_`. Anything else is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("PERM_").unwrap_or(&upper) {
            "PUBLIC" => Ok(Permission::Public),
            "LOGGEDIN" | "LOGGED_IN" => Ok(Permission::LoggedIn),
            "OWNER" => Ok(Permission::Owner),
            "ADMIN" => Ok(Permission::Admin),
            other => Err(format!("unknown permission level: {}", other)),
        }
    }
}

/// A caller whose identity has already been established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Internal key of the caller's `persons` document.
    pub id: DocId,
    /// Opaque code of the caller, as seen by clients.
    pub code: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn new(id: DocId, code: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            username: username.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

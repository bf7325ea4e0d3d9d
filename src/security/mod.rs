//! Security Provider contract: bearer-token validation and the role →
//! permission matrix. Key custody and account storage live outside this
//! crate; the API consumes tokens purely through [`SecurityProvider`].

pub mod hmac;

pub use hmac::HmacSecurityProvider;

use serde::{Deserialize, Serialize};

// ─── Roles ───────────────────────────────────────────────────────────────────

/// Client roles, totally ordered: viewer < operator < admin.
///
/// A method requiring role R is satisfied by any role ≥ R.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "viewer" => Some(Role::Viewer),
            "operator" => Some(Role::Operator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Static role → permission strings, returned by `authenticate`.
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Viewer => &["view"],
            Role::Operator => &["view", "control"],
            Role::Admin => &["view", "control", "admin"],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Token claims ────────────────────────────────────────────────────────────

/// Validated claims extracted from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — the authenticated user id.
    pub sub: String,
    pub role: Role,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token expired at {0}")]
    Expired(i64),
    #[error("token carries unknown role '{0}'")]
    UnknownRole(String),
}

// ─── Provider contract ───────────────────────────────────────────────────────

/// Mints and validates bearer tokens and maps roles to permissions.
pub trait SecurityProvider: Send + Sync {
    /// Validate a bearer token and return its claims.
    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError>;

    /// Mint a token for `user_id` with `role`, valid for `ttl_hours`.
    fn generate_token(&self, user_id: &str, role: Role, ttl_hours: u64)
        -> Result<String, AuthError>;

    /// Permission strings granted to a role. The default is the static
    /// matrix; providers backed by an external policy store may override.
    fn permissions(&self, role: Role) -> &'static [&'static str] {
        role.permissions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered() {
        assert!(Role::Viewer < Role::Operator);
        assert!(Role::Operator < Role::Admin);
        assert!(Role::Admin >= Role::Viewer);
    }

    #[test]
    fn permissions_widen_with_role() {
        assert_eq!(Role::Viewer.permissions(), &["view"]);
        assert!(Role::Admin.permissions().contains(&"admin"));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Viewer, Role::Operator, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }
}

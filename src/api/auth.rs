//! Dispatch-time authentication and permission checks.
//!
//! Authentication itself happens in the `authenticate` handler; this module
//! is the gate the dispatcher runs on every call: is the connection
//! authenticated, has its token expired since, and does its role rank high
//! enough for the method.

use crate::api::connection::{AuthState, ClientConnection};
use crate::api::error::RpcError;
use crate::security::Role;
use tracing::debug;

/// Verify the connection is authenticated and unexpired, returning the
/// effective auth state.
///
/// Expiry is enforced lazily: the first dispatch after the token's `exp`
/// demotes the connection back to anonymous and fails with −32001. The
/// connection itself stays open — the client may re-authenticate.
pub fn check_authenticated(client: &ClientConnection) -> Result<AuthState, RpcError> {
    let auth = client.auth_snapshot();
    if !auth.authenticated {
        return Err(RpcError::auth_required(
            "this method requires an authenticated connection",
        ));
    }
    if let Some(expires_at) = auth.expires_at {
        if chrono::Utc::now().timestamp() >= expires_at {
            client.clear_auth();
            debug!(client_id = client.id, "session expired; demoted to anonymous");
            return Err(RpcError::auth_required(
                "session token has expired; authenticate again",
            ));
        }
    }
    Ok(auth)
}

/// Role check against the method's declared minimum.
pub fn check_permission(
    method: &str,
    auth: &AuthState,
    required: Role,
) -> Result<(), RpcError> {
    let role = auth.role.unwrap_or(Role::Viewer);
    if role >= required {
        Ok(())
    } else {
        Err(RpcError::permission_denied(method, role.as_str()))
    }
}

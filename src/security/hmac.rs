//! HMAC-SHA256 signed bearer tokens.
//!
//! Token format is three base64url segments, `header.claims.tag`, where the
//! tag is HMAC-SHA256 over `header.claims` with the configured secret key.
//! Verification is constant-time via the `hmac` crate's tag comparison, so
//! the daemon cannot be used as a token oracle.

use super::{AuthError, Role, SecurityProvider, TokenClaims};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

pub struct HmacSecurityProvider {
    key: Vec<u8>,
}

impl HmacSecurityProvider {
    pub fn new(secret_key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: secret_key.into(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length; new_from_slice only fails for
        // zero-length output sizes, which Sha256 never has.
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }
}

impl SecurityProvider for HmacSecurityProvider {
    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut parts = token.split('.');
        let (header, claims, tag) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(h), Some(c), Some(t), None) => (h, c, t),
            _ => return Err(AuthError::Malformed),
        };

        let tag_bytes = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        mac.verify_slice(&tag_bytes)
            .map_err(|_| AuthError::BadSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims)
            .map_err(|_| AuthError::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&claims_json).map_err(|_| AuthError::Malformed)?;

        let now = chrono::Utc::now().timestamp();
        if claims.exp <= now {
            return Err(AuthError::Expired(claims.exp));
        }

        Ok(claims)
    }

    fn generate_token(
        &self,
        user_id: &str,
        role: Role,
        ttl_hours: u64,
    ) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = TokenClaims {
            sub: user_id.to_owned(),
            role,
            iat: now,
            exp: now + (ttl_hours as i64) * 3600,
        };
        let claims_json = serde_json::to_vec(&claims).map_err(|_| AuthError::Malformed)?;

        let header = URL_SAFE_NO_PAD.encode(HEADER.as_bytes());
        let claims = URL_SAFE_NO_PAD.encode(&claims_json);

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{header}.{claims}.{tag}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HmacSecurityProvider {
        HmacSecurityProvider::new(b"test-secret-key".to_vec())
    }

    #[test]
    fn round_trips_valid_tokens() {
        let p = provider();
        let token = p.generate_token("alice", Role::Operator, 24).unwrap();
        let claims = p.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::Operator);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_tampered_claims() {
        let p = provider();
        let token = p.generate_token("alice", Role::Viewer, 24).unwrap();
        // Swap the claims segment for one minting admin.
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                sub: "alice".into(),
                role: Role::Admin,
                iat: 0,
                exp: i64::MAX,
            })
            .unwrap(),
        );
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_claims;
        let forged = parts.join(".");
        assert!(matches!(
            p.validate_token(&forged),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn rejects_wrong_key() {
        let token = provider()
            .generate_token("alice", Role::Viewer, 24)
            .unwrap();
        let other = HmacSecurityProvider::new(b"different-key".to_vec());
        assert!(matches!(
            other.validate_token(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn rejects_expired_tokens() {
        let p = provider();
        let token = p.generate_token("alice", Role::Viewer, 0).unwrap();
        assert!(matches!(p.validate_token(&token), Err(AuthError::Expired(_))));
    }

    #[test]
    fn rejects_garbage() {
        let p = provider();
        assert!(matches!(p.validate_token(""), Err(AuthError::Malformed)));
        assert!(matches!(
            p.validate_token("a.b"),
            Err(AuthError::Malformed)
        ));
        assert!(matches!(
            p.validate_token("not!.base64!.data!"),
            Err(AuthError::Malformed)
        ));
    }
}

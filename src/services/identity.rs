//! Session tokens issued by the identity provider.
//!
//! A token is `<user_id>.<signature>` where the signature is HMAC-SHA1 of
//! the user id under the shared session secret, base64url-encoded without
//! padding. This service only verifies tokens; issuing them belongs to the
//! sign-in flow, which lives elsewhere. `sign_session` exists for tooling
//! and tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha1::Sha1;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Identity;

type HmacSha1 = Hmac<Sha1>;

fn mac_for(secret: &str, user_id: &str) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(user_id.as_bytes());
    Some(mac)
}

pub fn sign_session(secret: &str, user_id: &str) -> String {
    let signature = mac_for(secret, user_id)
        .map(|mac| URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{user_id}.{signature}")
}

/// Returns the user id a well-formed, correctly signed token was issued for.
pub fn verify_session(secret: &str, token: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }

    let (user_id, signature) = token.rsplit_once('.')?;
    if user_id.is_empty() {
        return None;
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    mac_for(secret, user_id)?.verify_slice(&signature).ok()?;

    Some(user_id.to_string())
}

/// Resolves a bearer token to the caller's identity. Unknown or inactive
/// users are treated the same as a bad signature.
pub fn resolve_caller(conn: &Connection, secret: &str, token: &str) -> Result<Identity, AppError> {
    let user_id = verify_session(secret, token).ok_or(AppError::Unauthenticated)?;

    match queries::get_user(conn, &user_id)? {
        Some(user) if user.is_active => Ok(Identity {
            user_id: user.id,
            role: user.role,
        }),
        _ => {
            tracing::debug!(user_id = %user_id, "session for unknown or inactive user");
            Err(AppError::Unauthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Role, User};

    const SECRET: &str = "test-secret";

    #[test]
    fn test_sign_then_verify() {
        let token = sign_session(SECRET, "C1");
        assert!(token.starts_with("C1."));
        assert_eq!(verify_session(SECRET, &token).as_deref(), Some("C1"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_session("other-secret", "C1");
        assert!(verify_session(SECRET, &token).is_none());
    }

    #[test]
    fn test_tampered_user_id_rejected() {
        let token = sign_session(SECRET, "C1");
        let forged = token.replacen("C1", "W1", 1);
        assert!(verify_session(SECRET, &forged).is_none());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(verify_session(SECRET, "").is_none());
        assert!(verify_session(SECRET, "C1").is_none());
        assert!(verify_session(SECRET, ".abc").is_none());
        assert!(verify_session(SECRET, "C1.not*base64").is_none());
        assert!(verify_session("", &sign_session("", "C1")).is_none());
    }

    #[test]
    fn test_resolve_caller() {
        let conn = db::init_db(":memory:").unwrap();
        let now = chrono::Utc::now().naive_utc();
        for (id, is_active) in [("W1", true), ("W2", false)] {
            queries::upsert_user(
                &conn,
                &User {
                    id: id.to_string(),
                    full_name: id.to_string(),
                    role: Role::Worker,
                    phone: None,
                    is_active,
                    created_at: now,
                },
            )
            .unwrap();
        }

        let identity = resolve_caller(&conn, SECRET, &sign_session(SECRET, "W1")).unwrap();
        assert_eq!(identity.role, Role::Worker);

        for user_id in ["W2", "nobody"] {
            let err = resolve_caller(&conn, SECRET, &sign_session(SECRET, user_id)).unwrap_err();
            assert!(matches!(err, AppError::Unauthenticated));
        }
    }
}

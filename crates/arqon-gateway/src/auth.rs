//! Shared-secret connect-token authentication.
//!
//! Tokens are a compact `<payload>.<signature>` pair: the payload is a
//! base64url-encoded JSON claims object (`exp`, `nbf`, `iat`, plus whatever
//! the issuer put in), the signature is base64url(HMAC-SHA256(secret,
//! payload_b64)). There is no header segment — the scheme is fixed, so
//! nothing needs to be negotiated.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    sub: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    BadSignature,
    Expired,
    NotYetValid,
}

/// Verifies a connect token against `secret`. `now` is injected so tests
/// can exercise expiry/not-before without racing the clock.
pub fn verify_token(token: &str, secret: &str, now: i64) -> Result<(), TokenError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;

    let expected_sig = sign(payload_b64, secret);
    let provided_sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| TokenError::Malformed)?;

    if expected_sig.len() != provided_sig.len() || expected_sig.ct_eq(&provided_sig).unwrap_u8() != 1 {
        return Err(TokenError::BadSignature);
    }

    let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| TokenError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

    if let Some(exp) = claims.exp {
        if now >= exp {
            return Err(TokenError::Expired);
        }
    }
    if let Some(nbf) = claims.nbf {
        if now < nbf {
            return Err(TokenError::NotYetValid);
        }
    }
    if let Some(iat) = claims.iat {
        if iat > now {
            return Err(TokenError::NotYetValid);
        }
    }

    Ok(())
}

fn sign(payload_b64: &str, secret: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload_b64.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Issues a token for `claims_json`, signed with `secret`. Used by tests
/// and can back an operator-facing token-minting command later.
pub fn issue_token(claims_json: &serde_json::Value, secret: &str) -> String {
    let payload = serde_json::to_vec(claims_json).expect("claims always serialize");
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let sig = sign(&payload_b64, secret);
    let sig_b64 = URL_SAFE_NO_PAD.encode(sig);
    format!("{payload_b64}.{sig_b64}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_token_round_trips() {
        let token = issue_token(&json!({"exp": 2_000_000_000, "iat": 1_000_000_000}), "secret");
        assert!(verify_token(&token, "secret", 1_000_000_500).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&json!({"exp": 2_000_000_000}), "secret");
        assert_eq!(verify_token(&token, "other", 1_000_000_000), Err(TokenError::BadSignature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(&json!({"exp": 1_000_000_000}), "secret");
        assert_eq!(verify_token(&token, "secret", 1_000_000_001), Err(TokenError::Expired));
    }

    #[test]
    fn not_yet_valid_token_is_rejected() {
        let token = issue_token(&json!({"nbf": 2_000_000_000}), "secret");
        assert_eq!(verify_token(&token, "secret", 1_000_000_000), Err(TokenError::NotYetValid));
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert_eq!(verify_token("not-a-token", "secret", 0), Err(TokenError::Malformed));
    }
}

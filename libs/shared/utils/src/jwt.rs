use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use shared_models::auth::{Operator, OperatorClaims};

type HmacSha256 = Hmac<Sha256>;

/// Verifies an HS256 operator token and returns the caller it identifies.
pub fn validate_operator_token(token: &str, jwt_secret: &str) -> Result<Operator, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let mut mac = match HmacSha256::new_from_slice(jwt_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };
    mac.update(signing_input.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Operator token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| "Invalid claims encoding".to_string())?;

    let claims: OperatorClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Operator token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let issued_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    Ok(Operator {
        id: claims.sub,
        role: claims.role,
        issued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::OperatorTokens;

    const SECRET: &str = "operator-secret-for-tests";

    #[test]
    fn accepts_valid_operator_token() {
        let token = OperatorTokens::create("alice", "operator", SECRET, 1);
        let operator = validate_operator_token(&token, SECRET).unwrap();
        assert_eq!(operator.id, "alice");
        assert!(operator.can_mutate());
    }

    #[test]
    fn rejects_tampered_expired_and_malformed_tokens() {
        let wrong_secret = OperatorTokens::create("alice", "operator", "other-secret", 1);
        assert_eq!(validate_operator_token(&wrong_secret, SECRET).unwrap_err(), "Invalid token signature");

        let expired = OperatorTokens::create("alice", "operator", SECRET, -1);
        assert_eq!(validate_operator_token(&expired, SECRET).unwrap_err(), "Token expired");

        assert!(validate_operator_token("not-a-token", SECRET).is_err());
        assert!(validate_operator_token("a.b.c", "").is_err());
    }

    #[test]
    fn viewer_role_cannot_mutate() {
        let token = OperatorTokens::create("bob", "viewer", SECRET, 1);
        let operator = validate_operator_token(&token, SECRET).unwrap();
        assert!(!operator.can_mutate());
    }
}

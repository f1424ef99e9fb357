use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

/// Token helpers for exercising the operator API in tests.
pub struct OperatorTokens;

impl OperatorTokens {
    pub fn create(subject: &str, role: &str, secret: &str, exp_hours: i64) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours);

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": subject,
            "role": role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let signature = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(signing_input.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        };
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn operator(secret: &str) -> String {
        Self::create("test-operator", "operator", secret, 24)
    }

    pub fn malformed() -> String {
        "invalid.token.format".to_string()
    }
}

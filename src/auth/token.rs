use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Sessions last seven days.
pub const TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Identity carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl SessionPayload {
    fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.email.is_empty() && !self.name.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    payload: SessionPayload,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Outcome of checking a token. There is no partial result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(SessionPayload),
    Invalid,
}

/// HS256 signer and verifier for session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, payload: &SessionPayload) -> Result<String, TokenError> {
        self.issue_at(payload, unix_now())
    }

    /// Signs `payload` as if issued at `iat` (seconds since the epoch).
    pub fn issue_at(&self, payload: &SessionPayload, iat: u64) -> Result<String, TokenError> {
        let claims = Claims {
            payload: payload.clone(),
            iat,
            exp: iat + TOKEN_TTL_SECS,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Verification {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) if data.claims.payload.is_complete() => Verification::Valid(data.claims.payload),
            _ => Verification::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SessionPayload {
        SessionPayload {
            user_id: "u-1".into(),
            email: "ana@example.com".into(),
            name: "Ana".into(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let codec = TokenCodec::new("secret");
        let token = codec.issue(&payload()).unwrap();
        assert_eq!(codec.verify(&token), Verification::Valid(payload()));
    }

    #[test]
    fn claims_use_camel_case_user_id() {
        let claims = Claims {
            payload: payload(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "u-1");
        assert_eq!(json["exp"], 2);
    }

    #[test]
    fn expired_token_is_invalid() {
        let codec = TokenCodec::new("secret");
        let eight_days_ago = unix_now() - 8 * 24 * 60 * 60;
        let token = codec.issue_at(&payload(), eight_days_ago).unwrap();
        assert_eq!(codec.verify(&token), Verification::Invalid);

        let six_days_ago = unix_now() - 6 * 24 * 60 * 60;
        let token = codec.issue_at(&payload(), six_days_ago).unwrap();
        assert!(matches!(codec.verify(&token), Verification::Valid(_)));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid() {
        let codec = TokenCodec::new("secret");
        let token = codec.issue(&payload()).unwrap();

        let (signed, signature) = token.rsplit_once('.').unwrap();
        let first = if signature.starts_with('A') { 'Q' } else { 'A' };
        let tampered = format!("{signed}.{first}{}", &signature[1..]);
        assert_eq!(codec.verify(&tampered), Verification::Invalid);

        let other = TokenCodec::new("another secret");
        assert_eq!(other.verify(&token), Verification::Invalid);

        assert_eq!(codec.verify(""), Verification::Invalid);
        assert_eq!(codec.verify("not.a.token"), Verification::Invalid);
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let codec = TokenCodec::new("secret");
        let claims = Claims {
            payload: payload(),
            iat: unix_now(),
            exp: unix_now() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert_eq!(codec.verify(&token), Verification::Invalid);
    }

    #[test]
    fn incomplete_payloads_are_invalid() {
        let codec = TokenCodec::new("secret");
        let key = EncodingKey::from_secret(b"secret");
        let exp = unix_now() + 60;

        let missing_name = serde_json::json!({"userId": "u-1", "email": "a@b.c", "exp": exp, "iat": 0});
        let token = encode(&Header::default(), &missing_name, &key).unwrap();
        assert_eq!(codec.verify(&token), Verification::Invalid);

        let empty_email = serde_json::json!({"userId": "u-1", "email": "", "name": "A", "exp": exp, "iat": 0});
        let token = encode(&Header::default(), &empty_email, &key).unwrap();
        assert_eq!(codec.verify(&token), Verification::Invalid);
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 session tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: &str) -> jsonwebtoken::errors::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new("test-secret", 1);
        let token = issuer.issue("user-1").unwrap();
        assert_eq!(issuer.verify(&token).unwrap().sub, "user-1");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenIssuer::new("a", 1).issue("user-1").unwrap();
        assert!(TokenIssuer::new("b", 1).verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // Past the default 60s leeway
        let issuer = TokenIssuer::new("test-secret", -1);
        let token = issuer.issue("user-1").unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}

// Access tokens: signed JWTs carrying caller claims
use crate::core::error::{UserError, UserErrorKind};
use crate::models::claims::Claims;
use anyhow::Context;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String, // Subject (user ID)
    admin: bool,
    #[serde(default)]
    shared: Vec<String>,
    exp: i64, // Expiration time
    iat: i64, // Issued at
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: Duration,
}

impl TokenService {
    pub fn new(secret: &str, expiration_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration: Duration::seconds(expiration_secs),
        }
    }

    /// Sign `claims` into a bearer token
    pub fn issue(&self, claims: &Claims) -> Result<String, UserError> {
        if claims.is_anonymous() {
            return Err(UserError::invalid_arguments("cannot issue a token for anonymous claims"));
        }

        let now = Utc::now();
        let token_claims = TokenClaims {
            sub: claims.id.clone(),
            admin: claims.admin,
            shared: claims.shared_accounts.clone(),
            exp: (now + self.expiration).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &token_claims, &self.encoding_key)
            .context("Failed to sign access token")
            .map_err(UserError::internal)
    }

    /// Check signature and expiry, returning the embedded claims
    pub fn verify(&self, token: &str) -> Result<Claims, UserError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| UserError::new(UserErrorKind::Unauthorized, e))?;

        Ok(Claims {
            id: data.claims.sub,
            admin: data.claims.admin,
            shared_accounts: data.claims.shared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            id: "user-123".to_string(),
            admin: false,
            shared_accounts: vec!["user-456".to_string()],
        }
    }

    #[test]
    fn test_token_creation_and_verification() {
        let tokens = TokenService::new("secret", 3600);

        let token = tokens.issue(&claims()).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), claims());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenService::new("secret", 3600).issue(&claims()).unwrap();
        let err = TokenService::new("other", 3600).verify(&token).unwrap_err();
        assert_eq!(err.kind(), UserErrorKind::Unauthorized);
    }

    #[test]
    fn test_expired_token_rejected() {
        // Default validation allows 60 seconds of leeway
        let tokens = TokenService::new("secret", -120);
        let token = tokens.issue(&claims()).unwrap();
        assert_eq!(tokens.verify(&token).unwrap_err().kind(), UserErrorKind::Unauthorized);
    }

    #[test]
    fn test_garbage_rejected() {
        let tokens = TokenService::new("secret", 3600);
        assert!(tokens.verify("not.a.token").is_err());
    }

    #[test]
    fn test_anonymous_claims_refused() {
        let tokens = TokenService::new("secret", 3600);
        let err = tokens.issue(&Claims::anonymous()).unwrap_err();
        assert_eq!(err.kind(), UserErrorKind::InvalidArguments);
    }
}

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;
use crate::db::models::{Account, Role};
use crate::error::{AppError, AuthError};

/// Verified identity claims carried by an access token. This is the
/// contract downstream services consume; they never see a raw claim map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id, as the JWT subject string.
    pub sub: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn account_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError(AuthError::InvalidToken))
    }
}

/// Mints and verifies both halves of the token pair: signed short-lived
/// access tokens, and opaque high-entropy refresh tokens that are stored
/// server-side only as a digest.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    pub fn mint_access_token(&self, account: &Account) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            email: account.email.clone(),
            role: account.role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(format!("failed to encode access token: {e}")))
    }

    /// Pure signature/expiry/shape check; no store access.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        let data = decode::<AccessClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::BadSignature,
            _ => AuthError::InvalidToken,
        })?;

        Ok(data.claims)
    }

    /// Expiry for a refresh session issued now.
    pub fn refresh_expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.refresh_ttl
    }
}

/// Generate an opaque refresh token: 256 bits from the OS RNG, URL-safe
/// base64. The cleartext leaves the process exactly once, in the
/// issuance response.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The stored form of a refresh token. One-way, fixed-length, unique per
/// token; lookups and revocations match on this.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn test_config(access_ttl_minutes: i64) -> AuthConfig {
        AuthConfig {
            jwt_secret: "test_secret".to_string(),
            access_token_ttl_minutes: access_ttl_minutes,
            refresh_token_ttl_days: 7,
            argon2_memory_kib: 8192,
            argon2_iterations: 1,
            audit_failures: false,
        }
    }

    fn test_account() -> Account {
        Account {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: Role::Moderator,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_mint_and_verify_access_token() {
        let issuer = TokenIssuer::new(&test_config(15));
        let token = issuer.mint_access_token(&test_account()).unwrap();

        let claims = issuer.verify_access_token(&token).unwrap();
        assert_eq!(claims.account_id().unwrap(), 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, Role::Moderator);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_expired_access_token_rejected() {
        let issuer = TokenIssuer::new(&test_config(-10));
        let token = issuer.mint_access_token(&test_account()).unwrap();

        let err = issuer.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_access_token_rejected() {
        let issuer = TokenIssuer::new(&test_config(15));
        let token = issuer.mint_access_token(&test_account()).unwrap();

        // Flip one character anywhere in the token.
        let mut tampered: Vec<char> = token.chars().collect();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = tampered.into_iter().collect();

        let err = issuer.verify_access_token(&tampered).unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenIssuer::new(&test_config(15));
        let token = issuer.mint_access_token(&test_account()).unwrap();

        let mut other_config = test_config(15);
        other_config.jwt_secret = "another_secret".to_string();
        let other = TokenIssuer::new(&other_config);

        let err = other.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::BadSignature)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let issuer = TokenIssuer::new(&test_config(15));
        let err = issuer.verify_access_token("not-a-token").unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
    }

    #[test]
    fn test_refresh_token_shape() {
        let token = generate_refresh_token();
        // 32 random bytes, URL-safe base64 without padding.
        assert_eq!(token.len(), 43);
        assert_ne!(token, generate_refresh_token());
    }

    #[test]
    fn test_token_digest_is_stable_and_opaque() {
        let token = generate_refresh_token();
        let digest = token_digest(&token);

        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest(&token));
        assert_ne!(digest, token_digest(&generate_refresh_token()));
        assert!(!digest.contains(&token));
    }
}

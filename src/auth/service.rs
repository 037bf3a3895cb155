use argon2::Argon2;
use chrono::Utc;
use tracing::{info, warn};
use validator::ValidateEmail;

use crate::auth::password;
use crate::auth::tokens::{self, AccessClaims, TokenIssuer};
use crate::config::AuthConfig;
use crate::db::models::{Account, LoginOrigin};
use crate::db::operations::DbOperations;
use crate::error::{AppError, AuthError};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 8;

/// A freshly issued token pair.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub account: Account,
}

/// Outcome of a credential check, kept internal so callers that audit
/// failures know which account the attempt resolved to.
enum CredentialCheck {
    Verified(Account),
    BadPassword(Account),
    Inactive(Account),
    UnknownIdentifier,
}

pub struct AuthService {
    db: DbOperations,
    argon2: Argon2<'static>,
    tokens: TokenIssuer,
    audit_failures: bool,
}

impl AuthService {
    pub fn new(db: DbOperations, config: &AuthConfig) -> Result<Self, AppError> {
        let argon2 = password::build_hasher(config.argon2_memory_kib, config.argon2_iterations)?;
        Ok(Self {
            db,
            argon2,
            tokens: TokenIssuer::new(config),
            audit_failures: config.audit_failures,
        })
    }

    /// Create an account from validated registration input.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, AppError> {
        validate_registration(username, email, password)?;

        // Friendly pre-check; the unique constraints remain the
        // race-proof backstop and map to the same error.
        if self.db.identifier_taken(username, email).await? {
            return Err(AppError::DuplicateIdentity);
        }

        let password_hash = password::hash_password(&self.argon2, password)?;
        let account = self.db.create_account(username, email, &password_hash).await?;

        info!(account_id = account.id, "account registered");
        Ok(account)
    }

    /// Check a username-or-email identifier against a password.
    ///
    /// Read-only: unknown identifier and wrong password collapse into
    /// the same generic failure, and the active flag is only consulted
    /// after the password matched so a 403 never confirms a guess.
    pub async fn verify_credentials(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Account, AppError> {
        match self.check_credentials(identifier, password).await? {
            CredentialCheck::Verified(account) => Ok(account),
            CredentialCheck::Inactive(_) => Err(AuthError::AccountInactive.into()),
            CredentialCheck::BadPassword(_) | CredentialCheck::UnknownIdentifier => {
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    async fn check_credentials(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<CredentialCheck, AppError> {
        let Some(account) = self.db.find_account_by_identifier(identifier).await? else {
            return Ok(CredentialCheck::UnknownIdentifier);
        };

        if !password::verify_password(&self.argon2, password, &account.password_hash)? {
            return Ok(CredentialCheck::BadPassword(account));
        }

        if !account.is_active {
            return Ok(CredentialCheck::Inactive(account));
        }

        Ok(CredentialCheck::Verified(account))
    }

    /// Authenticate and issue a token pair. The new session row and its
    /// audit row are persisted as one atomic unit.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        origin: LoginOrigin,
    ) -> Result<LoginOutcome, AppError> {
        let account = match self.check_credentials(identifier, password).await? {
            CredentialCheck::Verified(account) => account,
            CredentialCheck::BadPassword(account) => {
                self.audit_failed_attempt(&account, &origin).await;
                return Err(AuthError::InvalidCredentials.into());
            }
            CredentialCheck::Inactive(account) => {
                self.audit_failed_attempt(&account, &origin).await;
                return Err(AuthError::AccountInactive.into());
            }
            CredentialCheck::UnknownIdentifier => {
                // No account row to attribute the attempt to.
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let access_token = self.tokens.mint_access_token(&account)?;
        let refresh_token = tokens::generate_refresh_token();
        let digest = tokens::token_digest(&refresh_token);

        let session = self
            .db
            .create_login_session(account.id, &digest, self.tokens.refresh_expiry(), &origin)
            .await?;

        info!(
            account_id = account.id,
            session_id = session.id,
            "login successful"
        );

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            account,
        })
    }

    /// Rotate a refresh token: revoke the presented session and issue a
    /// replacement in one transaction. A token that was never issued,
    /// was already rotated or revoked, or just lost a concurrent replay
    /// race gets the same merged rejection.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let digest = tokens::token_digest(refresh_token);
        let now = Utc::now();

        let mut tx = self.db.begin_transaction().await?;

        let Some(old_session) = self
            .db
            .revoke_live_session_with_transaction(&mut tx, &digest, now)
            .await?
        else {
            tx.rollback().await?;
            return Err(AuthError::InvalidToken.into());
        };

        if old_session.is_expired_at(now) {
            // Keep the revocation: an expired digest is never usable again.
            tx.commit().await?;
            return Err(AuthError::InvalidToken.into());
        }

        let account = self
            .db
            .find_account_by_id_with_transaction(&mut tx, old_session.account_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !account.is_active {
            tx.commit().await?;
            return Err(AuthError::AccountInactive.into());
        }

        let new_refresh_token = tokens::generate_refresh_token();
        let new_digest = tokens::token_digest(&new_refresh_token);
        let new_session = self
            .db
            .insert_session_with_transaction(
                &mut tx,
                account.id,
                &new_digest,
                self.tokens.refresh_expiry(),
            )
            .await?;

        tx.commit().await?;

        let access_token = self.tokens.mint_access_token(&account)?;

        info!(
            account_id = account.id,
            old_session_id = old_session.id,
            new_session_id = new_session.id,
            "refresh token rotated"
        );

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
        })
    }

    /// Revoke the session matching a refresh token. Idempotent: a stale
    /// or unknown token acks the same way, so logout leaks no session
    /// state.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let digest = tokens::token_digest(refresh_token);
        let revoked = self.db.revoke_session(&digest).await?;
        if revoked {
            info!("session revoked by logout");
        }
        Ok(())
    }

    /// Pure access-token check, exposed for downstream consumers.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.tokens.verify_access_token(token)
    }

    /// Resolve a bearer access token to its account, re-reading the
    /// store so a deactivation that postdates the token takes effect.
    pub async fn current_user(&self, access_token: &str) -> Result<Account, AppError> {
        let claims = self.tokens.verify_access_token(access_token)?;
        let account = self
            .db
            .find_account_by_id(claims.account_id()?)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !account.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        Ok(account)
    }

    async fn audit_failed_attempt(&self, account: &Account, origin: &LoginOrigin) {
        if !self.audit_failures {
            return;
        }
        if let Err(e) = self.db.record_login_event(account.id, false, origin).await {
            warn!(account_id = account.id, "failed to record login event: {}", e);
        }
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), AppError> {
    let username_len = username.chars().count();
    if username_len < USERNAME_MIN || username_len > USERNAME_MAX {
        return Err(AppError::ValidationError(format!(
            "username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }

    if !email.validate_email() {
        return Err(AppError::ValidationError(
            "email address is not valid".to_string(),
        ));
    }

    if password.chars().count() < PASSWORD_MIN {
        return Err(AppError::ValidationError(format!(
            "password must be at least {PASSWORD_MIN} characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration("alice", "alice@example.com", "password123").is_ok());

        // Username bounds
        assert!(validate_registration("al", "alice@example.com", "password123").is_err());
        assert!(validate_registration(&"a".repeat(51), "alice@example.com", "password123").is_err());
        assert!(validate_registration(&"a".repeat(50), "alice@example.com", "password123").is_ok());

        // Email shape
        assert!(validate_registration("alice", "not-an-email", "password123").is_err());
        assert!(validate_registration("alice", "alice@", "password123").is_err());

        // Password length
        assert!(validate_registration("alice", "alice@example.com", "short").is_err());
        assert!(validate_registration("alice", "alice@example.com", "12345678").is_ok());
    }
}

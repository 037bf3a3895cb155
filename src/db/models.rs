use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account privilege level, lowest to highest. The variant order is the
/// capability order, so `Role` comparisons go through `rank()` rather
/// than ad-hoc string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Moderator => 1,
            Role::Admin => 2,
        }
    }

    /// Whether this role carries at least the privileges of `other`.
    pub fn at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }
}

/// A registered account. Deliberately not `Serialize`: the password hash
/// must never reach a response body, so responses go through
/// [`AccountSummary`] instead.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// The response-safe projection of an account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

/// A refresh-token session row. The cleartext token is handed to the
/// caller exactly once; only its SHA-256 digest is stored here.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub id: i64,
    pub account_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && !self.is_expired_at(now)
    }
}

/// Request metadata recorded alongside a login attempt.
#[derive(Debug, Clone)]
pub struct LoginOrigin {
    pub ip_address: String,
    pub user_agent: String,
}

/// Append-only audit row; never updated or deleted by this service.
#[derive(Debug, Clone, FromRow)]
pub struct LoginEvent {
    pub id: i64,
    pub account_id: i64,
    pub success: bool,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin.at_least(Role::Moderator));
        assert!(Role::Moderator.at_least(Role::User));
        assert!(Role::User.at_least(Role::User));
        assert!(!Role::User.at_least(Role::Moderator));
        assert!(!Role::Moderator.at_least(Role::Admin));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Moderator).unwrap(), "\"moderator\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_session_liveness() {
        let now = Utc::now();
        let session = RefreshSession {
            id: 1,
            account_id: 1,
            token_hash: "digest".to_string(),
            expires_at: now + Duration::days(7),
            revoked_at: None,
            created_at: now,
        };
        assert!(session.is_live_at(now));

        let expired = RefreshSession {
            expires_at: now - Duration::seconds(1),
            ..session.clone()
        };
        assert!(expired.is_expired_at(now));
        assert!(!expired.is_live_at(now));

        let revoked = RefreshSession {
            revoked_at: Some(now),
            ..session
        };
        assert!(!revoked.is_live_at(now));
    }
}

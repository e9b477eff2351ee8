use crate::error::AppError;
use crate::model::{generate_id, Id, UnknownVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Staff roles, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Staff,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "STAFF",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STAFF" => Ok(Role::Staff),
            "MANAGER" => Ok(Role::Manager),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub tenant_id: Id,
    pub branch_id: Option<Id>,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        tenant_id: Id,
        branch_id: Option<Id>,
        username: &str,
        display_name: Option<String>,
        password_hash: String,
        role: Role,
    ) -> Self {
        let username = normalize_username(username);
        Self {
            id: generate_id(),
            tenant_id,
            branch_id,
            display_name: display_name.unwrap_or_else(|| username.clone()),
            username,
            password_hash,
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub branch_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub branch_id: Option<Id>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A persisted login. Only the hash of the cookie token is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Id,
    pub tenant_id: Id,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The authenticated caller, resolved from the session cookie and attached to
/// each request. Used for tenant scoping, role gates and the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: Id,
    pub tenant_id: Id,
    pub branch_id: Option<Id>,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

impl SessionUser {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            branch_id: user.branch_id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        }
    }

    /// System actor for seeding and maintenance inside one tenant.
    pub fn system(tenant_id: Id) -> Self {
        Self {
            user_id: "system".to_string(),
            tenant_id,
            branch_id: None,
            username: "system".to_string(),
            display_name: "System".to_string(),
            role: Role::Admin,
        }
    }

    pub fn require_role(&self, minimum: Role) -> Result<(), AppError> {
        if self.role >= minimum {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "requires {} role",
                minimum.as_str()
            )))
        }
    }

    /// Staff bound to a branch may only work that branch's stock and jobs.
    pub fn require_branch(&self, branch_id: &str) -> Result<(), AppError> {
        match (&self.branch_id, self.role) {
            (Some(own), Role::Staff) if own != branch_id => Err(AppError::Forbidden(
                "branch is outside this account's assignment".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

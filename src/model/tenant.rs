use crate::model::{generate_id, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repair shop. Every other row belongs to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Id,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: String) -> Self {
        Self {
            id: generate_id(),
            name,
            created_at: Utc::now(),
        }
    }
}

/// A physical shop location holding its own stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: Id,
    pub tenant_id: Id,
    pub name: String,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Branch {
    pub fn new(tenant_id: Id, name: String, address: Option<String>) -> Self {
        Self {
            id: generate_id(),
            tenant_id,
            name,
            address,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBranch {
    pub name: String,
    pub address: Option<String>,
}

/// Self-service shop registration: tenant, first branch and its admin.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantRegistration {
    pub shop_name: String,
    pub branch_name: Option<String>,
    pub admin: NewAdmin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAdmin {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

//! The authenticated caller of a core operation.

use classbank_shared::types::{TenantId, UserId};
use serde::{Deserialize, Serialize};

/// Role of a user inside a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Student with a bank account.
    Student,
    /// Teacher controlling a class treasury.
    Teacher,
    /// School administrator.
    Admin,
}

impl Role {
    /// Returns the role as it appears in tokens.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Who is calling, as established by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Calling user.
    pub user_id: UserId,
    /// Tenant every read and write is scoped to.
    pub tenant_id: TenantId,
    /// Role inside the tenant.
    pub role: Role,
    /// Class the user belongs to, if any.
    pub class_name: Option<String>,
}

impl Actor {
    /// True for teachers and admins.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }
}

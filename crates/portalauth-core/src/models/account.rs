use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Account {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity for Account {
    fn identifier(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum AdminType {
    Developer,
    SuperAdmin,
    Admin,
}

impl fmt::Display for AdminType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminType::Developer => write!(f, "Developer"),
            AdminType::SuperAdmin => write!(f, "Super Admin"),
            AdminType::Admin => write!(f, "Admin"),
        }
    }
}

/// Profile returned by the admin portal's `me` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct AdminAccount {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub name: String,
    pub admin_type: AdminType,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AdminAccount {
    /// Check a granted ability, e.g. `admin.manage`.
    /// A `*` scope grants everything.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == "*")
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.username)
    }
}

impl Identity for AdminAccount {
    fn identifier(&self) -> String {
        self.id.to_string()
    }
}

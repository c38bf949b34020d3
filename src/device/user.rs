use serde::{Deserialize, Serialize};

use super::nullable;

/// Authenticated operator, as returned by `/api/auth/me`
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,

    #[serde(default)]
    pub full_name: Option<String>,

    pub role: String,

    #[serde(default, deserialize_with = "nullable")]
    pub permissions: Vec<String>,
}

impl CurrentUser {
    /// Permission required to download the CSV export
    pub const EXPORT_DATA: &'static str = "export:data";

    /// Permission required to manage operators
    pub const MANAGE_USERS: &'static str = "manage:users";

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// "Full Name (ROLE)" or "username (ROLE)"
    pub fn display_name(&self) -> String {
        let name = match self.full_name.as_deref() {
            Some(full_name) if !full_name.is_empty() => full_name,
            _ => &self.username,
        };
        format!("{} ({})", name, self.role.to_uppercase())
    }
}

/// Operator account, as listed by `/api/users`
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,

    #[serde(default)]
    pub full_name: Option<String>,

    pub role: String,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub created_at: i64,

    #[serde(default, deserialize_with = "nullable")]
    pub assigned_devices: Vec<String>,
}

/// Creation or partial update of an operator account
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct UserDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_devices: Option<Vec<String>>,
}

//! GoTrue admin endpoints. These only work with the service-role key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{SupabaseClient, SupabaseError};

pub const USERS_PER_PAGE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthUser {
    pub fn role_in(metadata: &Map<String, Value>) -> Option<&str> {
        metadata.get("role").and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<AuthUser>,
}

impl SupabaseClient {
    pub fn list_users(&self, page: usize, per_page: usize) -> Result<Vec<AuthUser>, SupabaseError> {
        let request = self
            .request("GET", "/auth/v1/admin/users")
            .query("page", &page.to_string())
            .query("per_page", &per_page.to_string());
        let response = self.send(request, None)?;
        let page: UserPage = Self::decode(response)?;
        Ok(page.users)
    }

    /// Walks every admin-API page until one comes back short.
    pub fn list_all_users(&self) -> Result<Vec<AuthUser>, SupabaseError> {
        let mut users = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.list_users(page, USERS_PER_PAGE)?;
            let fetched = batch.len();
            users.extend(batch);
            if fetched < USERS_PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(users)
    }

    /// Sends `attributes` (e.g. `{"app_metadata": {...}}`) to the admin
    /// update endpoint and returns the updated user.
    pub fn update_user(&self, id: &str, attributes: &Value) -> Result<AuthUser, SupabaseError> {
        let request = self.request("PUT", &format!("/auth/v1/admin/users/{id}"));
        let response = self.send(request, Some(attributes))?;
        Self::decode(response)
    }
}

//! Role promotion: grants a role to an account in the `profiles` table and
//! in both metadata maps of its auth user.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::catalog::{Table, now_timestamp};
use crate::store::{Filter, Row, RowStore};
use crate::supabase::{AuthUser, SupabaseClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            "user" => Ok(Role::User),
            other => bail!("unknown role: {other} (expected admin, supervisor or user)"),
        }
    }
}

/// The account side of promotion. Implemented by the admin API client.
pub trait UserDirectory {
    fn all_users(&self) -> Result<Vec<AuthUser>>;
    fn update_user(&self, id: &str, attributes: &Value) -> Result<AuthUser>;
}

impl UserDirectory for SupabaseClient {
    fn all_users(&self) -> Result<Vec<AuthUser>> {
        Ok(self.list_all_users()?)
    }

    fn update_user(&self, id: &str, attributes: &Value) -> Result<AuthUser> {
        Ok(SupabaseClient::update_user(self, id, attributes)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileChange {
    Created,
    Updated,
    Unchanged,
}

/// Where the role ended up after the final re-read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionReport {
    pub in_profiles: bool,
    pub in_app_metadata: bool,
    pub in_user_metadata: bool,
}

impl PromotionReport {
    pub fn is_complete(&self) -> bool {
        self.in_profiles && self.in_app_metadata && self.in_user_metadata
    }
}

pub fn find_user_by_email<'a>(users: &'a [AuthUser], email: &str) -> Option<&'a AuthUser> {
    users.iter().find(|user| {
        user.email
            .as_deref()
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email.trim()))
    })
}

/// Returns a copy of `metadata` with `role` and `updated_at` replaced.
pub fn merge_role(
    metadata: &Map<String, Value>,
    role: Role,
    updated_at: &str,
) -> Map<String, Value> {
    let mut merged = metadata.clone();
    merged.insert("role".to_string(), json!(role.as_str()));
    merged.insert("updated_at".to_string(), json!(updated_at));
    merged
}

pub struct Promoter<'a, U, D> {
    users: &'a U,
    store: &'a D,
}

impl<'a, U: UserDirectory, D: RowStore> Promoter<'a, U, D> {
    pub fn new(users: &'a U, store: &'a D) -> Self {
        Self { users, store }
    }

    pub fn promote(&self, email: &str, role: Role) -> Result<PromotionReport> {
        info!("looking for user with email {email}");
        let users = self.users.all_users().context("Listing auth users")?;
        let Some(user) = find_user_by_email(&users, email) else {
            let known: Vec<&str> = users.iter().filter_map(|u| u.email.as_deref()).collect();
            bail!("user {email} not found; known emails: {}", known.join(", "));
        };
        info!("found user {}", user.id);

        match self.ensure_profile(user, email, role)? {
            ProfileChange::Created => info!("profile created with role {role}"),
            ProfileChange::Updated => info!("profile role updated to {role}"),
            ProfileChange::Unchanged => info!("profile already has role {role}"),
        }

        let updated_at = now_timestamp();
        let attributes = json!({
            "app_metadata": merge_role(&user.app_metadata, role, &updated_at),
            "user_metadata": merge_role(&user.user_metadata, role, &updated_at),
        });
        if let Err(err) = self.users.update_user(&user.id, &attributes) {
            warn!("updating auth metadata failed: {err:#}");
        }

        self.verify(&user.id, role)
    }

    fn ensure_profile(&self, user: &AuthUser, email: &str, role: Role) -> Result<ProfileChange> {
        let table = Table::Profiles.name();
        let existing = self
            .store
            .find_one(table, "id", json!(user.id))
            .context("Reading profile")?;
        let now = now_timestamp();
        match existing {
            None => {
                let username = email.split('@').next().unwrap_or(email);
                let mut row = Row::new();
                row.insert("id".into(), json!(user.id));
                row.insert("username".into(), json!(username));
                row.insert("role".into(), json!(role.as_str()));
                row.insert("created_at".into(), json!(now));
                row.insert("updated_at".into(), json!(now));
                self.store.insert(table, &[row]).context("Creating profile")?;
                Ok(ProfileChange::Created)
            }
            Some(profile) if profile.get("role").and_then(Value::as_str) == Some(role.as_str()) => {
                Ok(ProfileChange::Unchanged)
            }
            Some(_) => {
                let mut patch = Row::new();
                patch.insert("role".into(), json!(role.as_str()));
                patch.insert("updated_at".into(), json!(now));
                self.store
                    .update(table, &[Filter::eq("id", user.id.clone())], &patch)
                    .context("Updating profile role")?;
                Ok(ProfileChange::Updated)
            }
        }
    }

    fn verify(&self, id: &str, role: Role) -> Result<PromotionReport> {
        let profile = self.store.find_one(Table::Profiles.name(), "id", json!(id))?;
        let users = self.users.all_users().context("Re-reading auth users")?;
        let user = users.iter().find(|user| user.id == id);
        let expected = Some(role.as_str());
        Ok(PromotionReport {
            in_profiles: profile
                .as_ref()
                .and_then(|row| row.get("role"))
                .and_then(Value::as_str)
                == expected,
            in_app_metadata: user.and_then(|u| AuthUser::role_in(&u.app_metadata)) == expected,
            in_user_metadata: user.and_then(|u| AuthUser::role_in(&u.user_metadata)) == expected,
        })
    }
}

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::Store;
use crate::db::models::ProfileRow;
use crate::db::operations;
use crate::error::LiftlogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Freshly signed up; not allowed to talk to the assistant.
    User,
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    pub fn can_use_assistant(&self) -> bool {
        !matches!(self, Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LiftlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(LiftlogError::Common(format!("unknown role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub created_at: i64,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let role = row.role.parse().unwrap_or_else(|_| {
            warn!("Profile {} has unknown role {:?}, treating as user", row.id, row.role);
            Role::User
        });
        Profile {
            id: row.id,
            username: row.username,
            role,
            created_at: row.created_at,
        }
    }
}

/// Looks the profile up by username, creating it with `default_role` on first
/// sight. New profiles get one exercise per name in `seed_exercises`.
pub async fn get_or_create_profile(
    store: &Store,
    username: &str,
    default_role: Role,
    seed_exercises: &[String],
) -> Result<Profile> {
    debug!("get_or_create_profile called username={}", username);
    let (row, created) =
        operations::get_or_create_profile(store, username, default_role.as_str(), seed_exercises)
            .await?;
    if created {
        info!(
            "Created profile {} for {} with {} seed exercises",
            row.id,
            username,
            seed_exercises.len()
        );
    }
    Ok(row.into())
}

/// Resolves the caller and checks they may use the assistant.
pub async fn authorize(
    store: &Store,
    username: &str,
    default_role: Role,
    seed_exercises: &[String],
) -> Result<Profile, LiftlogError> {
    if username.trim().is_empty() {
        return Err(LiftlogError::Unauthorized);
    }
    let profile = get_or_create_profile(store, username, default_role, seed_exercises).await?;
    if !profile.role.can_use_assistant() {
        info!("Denied {} with role {}", profile.username, profile.role);
        return Err(LiftlogError::Unauthorized);
    }
    Ok(profile)
}

pub async fn set_role(store: &Store, username: &str, role: Role) -> Result<bool> {
    let updated = operations::set_profile_role(store, username, role.as_str()).await?;
    Ok(updated > 0)
}

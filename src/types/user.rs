use serde::{Deserialize, Serialize};

use crate::types::geo::Coords;

/// Name shown when a user has neither a username nor a usable email.
pub const FALLBACK_DISPLAY_NAME: &str = "User";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub email: String,
    /// Absent until the first location publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl UserRecord {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            username: None,
            email: email.into(),
            coords: None,
            updated_at: None,
            created_at: None,
        }
    }

    pub fn is_locatable(&self) -> bool {
        self.coords.is_some()
    }

    pub fn display_name(&self) -> String {
        display_name(self.username.as_deref(), &self.email)
    }
}

/// Username if set, otherwise the local part of the email.
pub fn display_name(username: Option<&str>, email: &str) -> String {
    if let Some(name) = username.map(str::trim)
        && !name.is_empty()
    {
        return name.to_string();
    }
    email_local_part(email)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string())
}

pub(crate) fn email_local_part(email: &str) -> Option<&str> {
    let local = email.trim().split('@').next()?.trim();
    if local.is_empty() { None } else { Some(local) }
}

/// Merge write for a user record. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub coords: Option<Coords>,
    pub updated_at: Option<i64>,
    pub created_at: Option<i64>,
}

impl UserPatch {
    pub fn location(coords: Coords, updated_at: i64) -> Self {
        Self {
            coords: Some(coords),
            updated_at: Some(updated_at),
            ..Self::default()
        }
    }

    pub fn apply(&self, record: &mut UserRecord) {
        if let Some(username) = &self.username {
            record.username = Some(username.clone());
        }
        if let Some(email) = &self.email {
            record.email = email.clone();
        }
        if let Some(coords) = self.coords {
            record.coords = Some(coords);
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = Some(updated_at);
        }
        if let Some(created_at) = self.created_at {
            record.created_at = Some(created_at);
        }
    }

    pub fn into_record(self, uid: &str) -> UserRecord {
        let mut record = UserRecord::new(uid, "");
        self.apply(&mut record);
        record
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::user::FALLBACK_DISPLAY_NAME;

/// The closed set of alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Help,
    Drinks,
    Emergency,
    ComeHere,
}

impl AlertKind {
    pub const ALL: [AlertKind; 4] = [
        AlertKind::Help,
        AlertKind::Drinks,
        AlertKind::Emergency,
        AlertKind::ComeHere,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AlertKind::Help => "help",
            AlertKind::Drinks => "drinks",
            AlertKind::Emergency => "emergency",
            AlertKind::ComeHere => "come_here",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AlertKind::Help => "I need help!",
            AlertKind::Drinks => "Let's grab a drink!",
            AlertKind::Emergency => "Help! Emergency!",
            AlertKind::ComeHere => "Come over here!",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            AlertKind::Help => "🆘",
            AlertKind::Drinks => "🍻",
            AlertKind::Emergency => "🚨",
            AlertKind::ComeHere => "📍",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown alert kind '{0}'")]
pub struct UnknownAlertKind(pub String);

impl FromStr for AlertKind {
    type Err = UnknownAlertKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        AlertKind::ALL
            .into_iter()
            .find(|kind| kind.label() == normalized)
            .ok_or_else(|| UnknownAlertKind(value.to_string()))
    }
}

/// A persisted alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub user_id: String,
    #[serde(default = "fallback_user_name")]
    pub user_name: String,
    pub message: String,
    #[serde(default)]
    pub emoji: String,
    /// Sender's clock, milliseconds since the epoch.
    pub created_at: i64,
}

fn fallback_user_name() -> String {
    FALLBACK_DISPLAY_NAME.to_string()
}

/// An alert that has been composed but not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub emoji: String,
    pub created_at: i64,
}

impl NewAlert {
    pub fn compose(
        kind: AlertKind,
        user_id: &str,
        user_name: Option<&str>,
        created_at: i64,
    ) -> Self {
        let user_name = user_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME);
        Self {
            kind,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            message: kind.message().to_string(),
            emoji: kind.emoji().to_string(),
            created_at,
        }
    }

    pub fn persisted(self, id: String) -> Alert {
        Alert {
            id,
            kind: self.kind,
            user_id: self.user_id,
            user_name: self.user_name,
            message: self.message,
            emoji: self.emoji,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertChange {
    pub kind: ChangeKind,
    pub alert: Alert,
}

impl AlertChange {
    pub fn added(alert: Alert) -> Self {
        Self {
            kind: ChangeKind::Added,
            alert,
        }
    }

    pub fn modified(alert: Alert) -> Self {
        Self {
            kind: ChangeKind::Modified,
            alert,
        }
    }

    pub fn removed(alert: Alert) -> Self {
        Self {
            kind: ChangeKind::Removed,
            alert,
        }
    }
}

/// One delta of the recent-alerts window.
///
/// `backlog` is set by stores that know the delta replays records which
/// existed before the subscription was opened. The first delta of a
/// subscription is always treated as backlog, flagged or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertWindowDelta {
    pub changes: Vec<AlertChange>,
    pub backlog: bool,
}

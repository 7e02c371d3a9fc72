use tracing::debug;

use crate::alerts::recent_alerts_by_user;
use crate::config::SyncConfig;
use crate::ports::{RecordStore, Viewport};
use crate::projection::{PositionProjector, Positions, ProjectionJob, ProjectionOutcome};
use crate::types::{Alert, ScreenPoint, UserRecord};

pub const SELF_LABEL: &str = "You";

/// A name tag drawn above a user's marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub uid: String,
    pub text: String,
    pub point: ScreenPoint,
}

/// What the map screen shows: known users, where their labels go, and the
/// selected user with their recent alerts.
#[derive(Debug, Clone)]
pub struct MapState {
    me: String,
    projector: PositionProjector,
    selected: Option<UserRecord>,
    history: Vec<Alert>,
    history_limit: usize,
}

impl MapState {
    pub fn new(me: &str, config: &SyncConfig) -> Self {
        Self {
            me: me.to_string(),
            projector: PositionProjector::new(config.label_offset_px),
            selected: None,
            history: Vec::new(),
            history_limit: config.history_limit,
        }
    }

    /// Replaces the known users and returns the projection to run for them.
    ///
    /// A selected user that disappeared is cleared, one that is still present
    /// is refreshed to its new record.
    pub fn replace_users(&mut self, users: Vec<UserRecord>) -> ProjectionJob {
        let selected_uid = self.selected.as_ref().map(|user| user.uid.clone());
        if let Some(uid) = selected_uid {
            match users.iter().find(|user| user.uid == uid) {
                Some(current) => self.selected = Some(current.clone()),
                None => {
                    debug!(uid = %uid, "selected user left");
                    self.clear_selection();
                }
            }
        }
        self.projector.set_users(users)
    }

    /// Applies a finished projection. Stale results are dropped.
    pub fn apply(&mut self, outcome: ProjectionOutcome) -> bool {
        self.projector.apply(outcome)
    }

    pub async fn set_users<V: Viewport>(
        &mut self,
        users: Vec<UserRecord>,
        viewport: &V,
    ) -> &Positions {
        let outcome = self.replace_users(users).run(viewport).await;
        self.projector.apply(outcome);
        self.projector.positions()
    }

    /// Reprojects after a pan, zoom or resize.
    pub async fn viewport_changed<V: Viewport>(&mut self, viewport: &V) -> &Positions {
        self.projector.refresh(viewport).await
    }

    /// Selects a known user and loads their most recent alerts.
    pub async fn select_user<S: RecordStore>(
        &mut self,
        store: &S,
        uid: &str,
    ) -> Option<&UserRecord> {
        let Some(user) = self.users().iter().find(|user| user.uid == uid).cloned() else {
            self.clear_selection();
            return None;
        };
        self.history = recent_alerts_by_user(store, uid, self.history_limit).await;
        self.selected = Some(user);
        self.selected.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.history.clear();
    }

    pub fn selected(&self) -> Option<&UserRecord> {
        self.selected.as_ref()
    }

    /// Recent alerts of the selected user, newest first.
    pub fn history(&self) -> &[Alert] {
        &self.history
    }

    pub fn users(&self) -> &[UserRecord] {
        self.projector.users()
    }

    pub fn positions(&self) -> &Positions {
        self.projector.positions()
    }

    /// Labels for every projected user. The local user is shown as "You".
    pub fn labels(&self) -> Vec<Label> {
        self.users()
            .iter()
            .filter_map(|user| {
                let point = self.projector.position_of(&user.uid)?;
                let text = if user.uid == self.me {
                    SELF_LABEL.to_string()
                } else {
                    user.display_name()
                };
                Some(Label {
                    uid: user.uid.clone(),
                    text,
                    point,
                })
            })
            .collect()
    }
}

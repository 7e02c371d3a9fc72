//! Placement of user labels on the map.
//!
//! Positions are recomputed whenever the user set or the viewport changes.
//! Recomputing is asynchronous, so a [`ProjectionJob`] carries the generation
//! of the state it was started from and [`PositionProjector::apply`] rejects
//! results computed against a user set that has since been replaced.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::ports::Viewport;
use crate::types::{ScreenPoint, UserRecord};

pub type Positions = HashMap<String, ScreenPoint>;

/// Projects every locatable user. Users without coordinates and users whose
/// projection fails are left out.
pub async fn project_users<V: Viewport>(
    viewport: &V,
    users: &[UserRecord],
    label_offset_px: f64,
) -> Positions {
    let mut positions = Positions::with_capacity(users.len());
    for user in users {
        let Some(coords) = user.coords else {
            continue;
        };
        match viewport.point_for(coords).await {
            Ok(point) => {
                let label = ScreenPoint::new(point.x, point.y - label_offset_px);
                positions.insert(user.uid.clone(), label);
            }
            Err(err) => {
                trace!(%err, uid = %user.uid, "projection failed");
            }
        }
    }
    positions
}

#[derive(Debug, Clone)]
pub struct ProjectionJob {
    generation: u64,
    users: Arc<[UserRecord]>,
    label_offset_px: f64,
}

impl ProjectionJob {
    pub async fn run<V: Viewport>(self, viewport: &V) -> ProjectionOutcome {
        let positions = project_users(viewport, &self.users, self.label_offset_px).await;
        ProjectionOutcome {
            generation: self.generation,
            positions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionOutcome {
    generation: u64,
    positions: Positions,
}

#[derive(Debug, Clone)]
pub struct PositionProjector {
    users: Arc<[UserRecord]>,
    positions: Positions,
    label_offset_px: f64,
    generation: u64,
    users_generation: u64,
    applied: u64,
}

impl PositionProjector {
    pub fn new(label_offset_px: f64) -> Self {
        Self {
            users: Arc::from(Vec::new()),
            positions: Positions::new(),
            label_offset_px,
            generation: 0,
            users_generation: 0,
            applied: 0,
        }
    }

    /// Replaces the user set and returns the job that projects it.
    pub fn set_users(&mut self, users: Vec<UserRecord>) -> ProjectionJob {
        self.users = Arc::from(users);
        let job = self.next_job();
        self.users_generation = job.generation;
        job
    }

    /// Returns a job for the current users after a pan, zoom, or resize.
    pub fn viewport_changed(&mut self) -> ProjectionJob {
        self.next_job()
    }

    /// Stores the outcome unless a newer job has already been applied or the
    /// user set changed after this job was started. Returns whether it was kept.
    pub fn apply(&mut self, outcome: ProjectionOutcome) -> bool {
        if outcome.generation < self.applied || outcome.generation < self.users_generation {
            trace!(generation = outcome.generation, "dropping stale projection");
            return false;
        }
        self.applied = outcome.generation;
        self.positions = outcome.positions;
        true
    }

    /// Projects the current users against `viewport` and applies the result.
    pub async fn refresh<V: Viewport>(&mut self, viewport: &V) -> &Positions {
        let job = self.viewport_changed();
        let outcome = job.run(viewport).await;
        self.apply(outcome);
        &self.positions
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn position_of(&self, uid: &str) -> Option<ScreenPoint> {
        self.positions.get(uid).copied()
    }

    fn next_job(&mut self) -> ProjectionJob {
        self.generation += 1;
        ProjectionJob {
            generation: self.generation,
            users: Arc::clone(&self.users),
            label_offset_px: self.label_offset_px,
        }
    }
}

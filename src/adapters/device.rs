//! Device services driven from code: a location source fed by explicit fixes
//! and a notifier that writes to the log.

use std::future::{Ready, ready};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::LocationError;
use crate::feed::{self, Feed, FeedSender};
use crate::ports::{
    ForegroundPresentation, LocalNotification, LocationService, Notifier, PermissionStatus,
    SamplingPolicy,
};
use crate::types::Position;

struct LocationState {
    permission: PermissionStatus,
    grant_on_request: bool,
    last: Option<Position>,
    watchers: Vec<FeedSender<Position>>,
}

/// A location service whose fixes are pushed by the caller.
#[derive(Clone)]
pub struct ScriptedLocation {
    state: Arc<Mutex<LocationState>>,
}

impl ScriptedLocation {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(LocationState {
                permission,
                grant_on_request: true,
                last: None,
                watchers: Vec::new(),
            })),
        }
    }

    /// Whether a permission request that is not already granted succeeds.
    pub fn grant_on_request(&self, grant: bool) {
        self.lock().grant_on_request = grant;
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        self.lock().permission = permission;
    }

    /// Records `position` as the current fix and reports it to every watcher.
    pub fn push(&self, position: Position) {
        let mut state = self.lock();
        state.last = Some(position);
        state.watchers.retain(|watcher| watcher.send(position));
    }

    /// Number of open watches.
    pub fn watchers(&self) -> usize {
        let mut state = self.lock();
        state.watchers.retain(|watcher| !watcher.is_closed());
        state.watchers.len()
    }

    fn lock(&self) -> MutexGuard<'_, LocationState> {
        self.state.lock().expect("scripted location lock")
    }

    fn request_now(&self) -> PermissionStatus {
        let mut state = self.lock();
        if !state.permission.is_granted() {
            state.permission = if state.grant_on_request {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
        }
        state.permission
    }

    fn current_now(&self) -> Result<Position, LocationError> {
        let state = self.lock();
        if !state.permission.is_granted() {
            return Err(LocationError::PermissionDenied);
        }
        state
            .last
            .ok_or_else(|| LocationError::Unavailable("no fix yet".to_string()))
    }
}

impl LocationService for ScriptedLocation {
    fn permission(&self) -> impl Future<Output = PermissionStatus> + Send + '_ {
        ready(self.lock().permission)
    }

    fn request_permission(&self) -> impl Future<Output = PermissionStatus> + Send + '_ {
        ready(self.request_now())
    }

    fn current_position(
        &self,
    ) -> impl Future<Output = Result<Position, LocationError>> + Send + '_ {
        ready(self.current_now())
    }

    fn watch_position(&self, policy: SamplingPolicy) -> Result<Feed<Position>, LocationError> {
        let mut state = self.lock();
        if !state.permission.is_granted() {
            return Err(LocationError::PermissionDenied);
        }
        let (sender, positions) = feed::channel();
        state.watchers.push(sender);
        debug!(interval_ms = policy.interval.as_millis() as u64, "location watch opened");
        Ok(positions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification could not be presented")]
    Rejected,
}

struct NotifierState {
    permission: PermissionStatus,
    grant_on_request: bool,
    requests: usize,
    failing: bool,
    foreground: Option<ForegroundPresentation>,
    presented: Vec<LocalNotification>,
}

/// Presents notifications by logging them.
#[derive(Clone)]
pub struct LogNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl LogNotifier {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState {
                permission,
                grant_on_request: true,
                requests: 0,
                failing: false,
                foreground: None,
                presented: Vec::new(),
            })),
        }
    }

    pub fn grant_on_request(&self, grant: bool) {
        self.lock().grant_on_request = grant;
    }

    /// Makes every presentation fail until cleared.
    pub fn fail_presenting(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn permission_requests(&self) -> usize {
        self.lock().requests
    }

    pub fn foreground_presentation(&self) -> Option<ForegroundPresentation> {
        self.lock().foreground
    }

    /// Notifications presented so far, oldest first.
    pub fn presented(&self) -> Vec<LocalNotification> {
        self.lock().presented.clone()
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().expect("log notifier lock")
    }

    fn present_now(&self, notification: &LocalNotification) -> Result<(), NotifyError> {
        let mut state = self.lock();
        if state.failing {
            return Err(NotifyError::Rejected);
        }
        info!(title = %notification.title, body = %notification.body, "notification");
        state.presented.push(notification.clone());
        Ok(())
    }

    fn request_now(&self) -> PermissionStatus {
        let mut state = self.lock();
        state.requests += 1;
        if !state.permission.is_granted() {
            state.permission = if state.grant_on_request {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
        }
        state.permission
    }
}

impl Notifier for LogNotifier {
    type Error = NotifyError;
    type Fut<'a>
        = Ready<Result<(), NotifyError>>
    where
        Self: 'a;

    fn present<'a>(&'a self, notification: &'a LocalNotification) -> Self::Fut<'a> {
        ready(self.present_now(notification))
    }

    fn permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, NotifyError>> + Send + '_ {
        ready(Ok(self.lock().permission))
    }

    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, NotifyError>> + Send + '_ {
        ready(Ok(self.request_now()))
    }

    fn set_foreground_presentation(&self, presentation: ForegroundPresentation) {
        self.lock().foreground = Some(presentation);
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::types::Coords;

    #[tokio::test]
    async fn request_permission__should_respect_grant_setting() {
        // Given
        let location = ScriptedLocation::new(PermissionStatus::Undetermined);
        location.grant_on_request(false);

        // Then
        assert_eq!(location.request_permission().await, PermissionStatus::Denied);
        location.grant_on_request(true);
        assert_eq!(location.request_permission().await, PermissionStatus::Granted);
    }

    #[tokio::test]
    async fn watch_position__should_require_permission() {
        let location = ScriptedLocation::new(PermissionStatus::Denied);

        let result = location.watch_position(SamplingPolicy::default());

        assert_eq!(result.err(), Some(LocationError::PermissionDenied));
    }

    #[tokio::test]
    async fn push__should_reach_open_watchers_only() {
        // Given
        let location = ScriptedLocation::new(PermissionStatus::Granted);
        let mut open = location.watch_position(SamplingPolicy::default()).expect("watch");
        let closed = location.watch_position(SamplingPolicy::default()).expect("watch");
        closed.cancel();
        let fix = Position::new(Coords::new(1.0, 1.0), 10);

        // When
        location.push(fix);

        // Then
        assert_eq!(open.recv().await, Some(fix));
        assert_eq!(location.watchers(), 1);
        assert_eq!(location.current_position().await, Ok(fix));
    }

    #[tokio::test]
    async fn present__should_record_only_successful_notifications() {
        // Given
        let notifier = LogNotifier::new(PermissionStatus::Granted);
        let notification = LocalNotification {
            title: "t".into(),
            body: "b".into(),
            sound: true,
            high_priority: true,
            data: Vec::new(),
        };

        // When
        notifier.fail_presenting(true);
        let failed = notifier.present(&notification).await;
        notifier.fail_presenting(false);
        notifier.present(&notification).await.expect("present");

        // Then
        assert_eq!(failed, Err(NotifyError::Rejected));
        assert_eq!(notifier.presented(), vec![notification]);
    }
}

//! Signed-in session lifecycle: starting every feed and the tracking loop
//! together, and stopping them as a group.

use tracing::{error, info, warn};

use crate::alerts::{
    AlertListener, install_foreground_presentation, request_notification_permission,
};
use crate::auth::AuthError;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::feed::Feed;
use crate::location::{LocationPublisher, TrackingHandle};
use crate::ports::{Authenticator, LocationService, Notifier, RecordStore, TimeProvider};
use crate::presence::watch_presence;
use crate::types::user::display_name;
use crate::types::{Alert, UserRecord};

/// The authenticated local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
}

impl Session {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }
}

/// Name attached to alerts sent by `session`: the username from the user's
/// own record, else the local part of the email, else the fallback name.
pub fn sender_display_name(session: &Session, users: &[UserRecord]) -> String {
    match users.iter().find(|user| user.uid == session.uid) {
        Some(own) => {
            let email = if own.email.trim().is_empty() {
                &session.email
            } else {
                &own.email
            };
            display_name(own.username.as_deref(), email)
        }
        None => display_name(None, &session.email),
    }
}

/// Everything a session needs from the outside world.
#[derive(Debug, Clone)]
pub struct SessionServices<S, L, N, T> {
    pub store: S,
    pub location: L,
    pub notifier: N,
    pub time: T,
    pub config: SyncConfig,
}

impl<S, L, N, T> SessionServices<S, L, N, T>
where
    S: RecordStore,
    L: LocationService,
    N: Notifier,
    T: TimeProvider,
{
    pub fn publisher(&self) -> LocationPublisher<L, S, T> {
        LocationPublisher::new(self.location.clone(), self.store.clone(), self.time.clone())
    }

    /// Runs the start sequence for `session`.
    ///
    /// Fails with [`SyncError::LocationPermissionDenied`] before opening
    /// anything when location access is refused. A refused notification
    /// permission only means alerts arrive without a banner.
    pub async fn start(&self, session: &Session) -> Result<ActiveSession, SyncError> {
        let publisher = self.publisher();
        if !publisher.request_permission().await {
            warn!(uid = %session.uid, "location permission denied; session not started");
            return Err(SyncError::LocationPermissionDenied);
        }

        if !request_notification_permission(&self.notifier).await {
            warn!(uid = %session.uid, "notification permission not granted");
        }
        install_foreground_presentation(&self.notifier);

        if let Some(fix) = publisher.current_location().await
            && let Err(err) = publisher.publish(&session.uid, fix.coords).await
        {
            error!(%err, uid = %session.uid, "failed to publish initial location");
        }
        let tracking = publisher
            .start_tracking(&session.uid, self.config.policy())
            .await;

        let presence = watch_presence(&self.store);
        let listener = AlertListener::new(
            self.store.clone(),
            self.notifier.clone(),
            self.time.clone(),
            self.config.alert_window,
        );
        let alerts = listener.listen(session);

        info!(uid = %session.uid, tracking = tracking.is_some(), "session started");
        Ok(ActiveSession {
            session: session.clone(),
            presence,
            alerts,
            tracking,
            stopped: false,
        })
    }
}

/// A running session. Dropping it stops everything it started.
#[derive(Debug)]
pub struct ActiveSession {
    session: Session,
    presence: Feed<Vec<UserRecord>>,
    alerts: Feed<Alert>,
    tracking: Option<TrackingHandle>,
    stopped: bool,
}

impl ActiveSession {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The presence feed. Holds at most the newest unread snapshot.
    pub fn presence(&mut self) -> &mut Feed<Vec<UserRecord>> {
        &mut self.presence
    }

    /// The live alert feed.
    pub fn alerts(&mut self) -> &mut Feed<Alert> {
        &mut self.alerts
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
            .as_ref()
            .is_some_and(|tracking| !tracking.is_stopped())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stops tracking and cancels both feeds. Later calls do nothing.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(tracking) = &self.tracking {
            tracking.stop();
        }
        self.presence.cancel();
        self.alerts.cancel();
        info!(uid = %self.session.uid, "session stopped");
    }

    /// Stops the session, then signs out.
    pub async fn end<A: Authenticator>(mut self, auth: &A) -> Result<(), AuthError> {
        self.stop();
        auth.sign_out().await
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::adapters::device::{LogNotifier, ScriptedLocation};
    use crate::adapters::memory::{MemoryAuthenticator, MemoryStore};
    use crate::alerts::AlertSender;
    use crate::ports::PermissionStatus;
    use crate::testing::TestTime;
    use crate::types::{AlertKind, Coords, Position, UserPatch};

    type TestServices = SessionServices<MemoryStore, ScriptedLocation, LogNotifier, TestTime>;

    fn services(
        store: &MemoryStore,
        location: &ScriptedLocation,
        notifier: &LogNotifier,
    ) -> TestServices {
        SessionServices {
            store: store.clone(),
            location: location.clone(),
            notifier: notifier.clone(),
            time: TestTime::at_millis(1_000),
            config: SyncConfig::default(),
        }
    }

    #[test]
    fn sender_display_name__should_prefer_username_then_email() {
        // Given
        let session = Session::new("u1", "ana@example.com");
        let mut own = UserRecord::new("u1", "ana@example.com");

        // Then
        assert_eq!(sender_display_name(&session, &[]), "ana");
        assert_eq!(sender_display_name(&session, &[own.clone()]), "ana");
        own.username = Some("Ana Maria".into());
        assert_eq!(sender_display_name(&session, &[own]), "Ana Maria");
        assert_eq!(sender_display_name(&Session::new("u2", ""), &[]), "User");
    }

    #[tokio::test]
    async fn start__should_fail_without_location_permission_and_open_nothing() {
        // Given
        let store = MemoryStore::new();
        let location = ScriptedLocation::new(PermissionStatus::Denied);
        location.grant_on_request(false);
        let notifier = LogNotifier::new(PermissionStatus::Granted);

        // When
        let result = services(&store, &location, &notifier)
            .start(&Session::new("u1", "ana@example.com"))
            .await;

        // Then
        assert!(matches!(result, Err(SyncError::LocationPermissionDenied)));
        assert_eq!(store.subscriptions(), 0);
        assert_eq!(location.watchers(), 0);
        assert_eq!(notifier.permission_requests(), 0);
    }

    #[tokio::test]
    async fn start__should_continue_when_notifications_are_refused() {
        // Given
        let store = MemoryStore::new();
        let location = ScriptedLocation::new(PermissionStatus::Granted);
        let notifier = LogNotifier::new(PermissionStatus::Undetermined);
        notifier.grant_on_request(false);

        // When
        let session = services(&store, &location, &notifier)
            .start(&Session::new("u1", "ana@example.com"))
            .await
            .expect("start");

        // Then
        assert!(session.is_tracking());
        assert_eq!(notifier.permission_requests(), 1);
        assert!(notifier.foreground_presentation().is_some());
    }

    #[tokio::test]
    async fn start__should_publish_initial_fix_and_open_feeds() {
        // Given
        let store = MemoryStore::new();
        let location = ScriptedLocation::new(PermissionStatus::Granted);
        let here = Coords::new(-23.5505, -46.6333);
        location.push(Position::new(here, 0));
        let notifier = LogNotifier::new(PermissionStatus::Granted);
        let me = Session::new("u1", "ana@example.com");

        // When
        let mut active = services(&store, &location, &notifier)
            .start(&me)
            .await
            .expect("start");
        AlertSender::new(store.clone(), TestTime::at_millis(2_000))
            .send(AlertKind::ComeHere, "u2", Some("bia"))
            .await
            .expect("send");

        // Then
        let users = active.presence().recv().await.expect("presence snapshot");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].coords, Some(here));
        let alert = active.alerts().recv().await.expect("alert");
        assert_eq!(alert.user_name, "bia");
        assert_eq!(notifier.presented().len(), 1);
    }

    #[tokio::test]
    async fn stop__should_end_feeds_and_tracking_once() {
        // Given
        let store = MemoryStore::new();
        let location = ScriptedLocation::new(PermissionStatus::Granted);
        let notifier = LogNotifier::new(PermissionStatus::Granted);
        let mut active = services(&store, &location, &notifier)
            .start(&Session::new("u1", "ana@example.com"))
            .await
            .expect("start");

        // When
        active.stop();
        active.stop();

        // Then
        assert!(active.is_stopped());
        assert!(!active.is_tracking());
        assert_eq!(active.presence().recv().await, None);
        assert_eq!(active.alerts().recv().await, None);
    }

    #[tokio::test]
    async fn end__should_stop_then_sign_out() {
        // Given
        let auth = MemoryAuthenticator::new();
        let me = auth
            .create_account("ana@example.com", "secret1")
            .await
            .expect("account");
        let store = MemoryStore::new();
        let location = ScriptedLocation::new(PermissionStatus::Granted);
        let notifier = LogNotifier::new(PermissionStatus::Granted);
        let mut active = services(&store, &location, &notifier)
            .start(&me)
            .await
            .expect("start");
        let presence = active.presence().cancel_handle();

        // When
        active.end(&auth).await.expect("end");

        // Then
        assert_eq!(auth.current_session(), None);
        assert!(presence.is_cancelled());
    }

    #[tokio::test]
    async fn presence__should_hold_one_snapshot_when_never_read() {
        // Given
        let store = MemoryStore::new();
        let location = ScriptedLocation::new(PermissionStatus::Granted);
        let notifier = LogNotifier::new(PermissionStatus::Granted);
        let mut active = services(&store, &location, &notifier)
            .start(&Session::new("u1", "ana@example.com"))
            .await
            .expect("start");

        // When
        for write in 0..500 {
            let uid = format!("user-{}", write % 50);
            let at = Coords::new(-23.5505, -46.6333).offset_m(write as f64, 0.0);
            store
                .merge_user(&uid, UserPatch::location(at, write))
                .await
                .expect("merge");
        }
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        // Then
        let mut buffered = Vec::new();
        while let Some(snapshot) = active.presence().try_recv() {
            buffered.push(snapshot);
        }
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered[0].len(), 50);
        let last = buffered[0].iter().find(|user| user.uid == "user-49").expect("user");
        assert_eq!(last.updated_at, Some(499));
    }
}

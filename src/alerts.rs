use tracing::{error, info};

use crate::error::StoreError;
use crate::ports::{RecordStore, TimeProvider};
use crate::types::{Alert, AlertKind, NewAlert};

mod listener;
pub(crate) mod notifications;

pub use listener::AlertListener;
pub use notifications::{install_foreground_presentation, request_notification_permission};

/// Composes and persists alerts. Failures go back to the caller; there is no
/// retry.
#[derive(Debug, Clone)]
pub struct AlertSender<S, T> {
    store: S,
    time: T,
}

impl<S, T> AlertSender<S, T>
where
    S: RecordStore,
    T: TimeProvider,
{
    pub fn new(store: S, time: T) -> Self {
        Self { store, time }
    }

    pub async fn send(
        &self,
        kind: AlertKind,
        user_id: &str,
        user_name: Option<&str>,
    ) -> Result<Alert, StoreError> {
        let alert = NewAlert::compose(kind, user_id, user_name, self.time.now_millis());
        let id = match self.store.create_alert(&alert).await {
            Ok(id) => id,
            Err(err) => {
                error!(%err, %kind, "failed to send alert");
                return Err(err);
            }
        };
        info!(%kind, alert = %id, "alert sent");
        Ok(alert.persisted(id))
    }
}

/// The author's most recent alerts, newest first. Errors yield an empty list.
pub async fn recent_alerts_by_user<S: RecordStore>(
    store: &S,
    uid: &str,
    limit: usize,
) -> Vec<Alert> {
    match store.alerts_by_author(uid, limit).await {
        Ok(alerts) => alerts,
        Err(err) => {
            error!(%err, uid, "failed to fetch recent alerts");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::testing::TestTime;

    #[tokio::test]
    async fn send__should_persist_emergency_with_fixed_text() {
        // Given
        let store = MemoryStore::new();
        let time = TestTime::at_millis(1_700_000_000_000);
        let sender = AlertSender::new(store.clone(), time.clone());
        let before = time.now_millis();

        // When
        let alert = sender
            .send(AlertKind::Emergency, "u1", Some("ana"))
            .await
            .expect("send");

        // Then
        let after = time.now_millis();
        assert_eq!(alert.message, AlertKind::Emergency.message());
        assert!(alert.created_at >= before && alert.created_at <= after);
        let stored = store.alerts_by_author("u1", 5).await.expect("query");
        assert_eq!(stored, vec![alert]);
    }

    #[tokio::test]
    async fn send__should_stamp_current_clock() {
        // Given
        let store = MemoryStore::new();
        let time = TestTime::at_millis(1000);
        let sender = AlertSender::new(store, time.clone());

        // When
        time.set_millis(4242);
        let alert = sender.send(AlertKind::Help, "u1", None).await.expect("send");

        // Then
        assert_eq!(alert.created_at, 4242);
        assert_eq!(alert.user_name, "User");
    }

    #[tokio::test]
    async fn send__should_propagate_write_failures() {
        // Given
        let store = MemoryStore::new();
        store.fail_writes(Some(StoreError::Unavailable("offline".into())));
        let sender = AlertSender::new(store.clone(), TestTime::at_millis(0));

        // When
        let result = sender.send(AlertKind::Drinks, "u1", None).await;

        // Then
        assert_eq!(result, Err(StoreError::Unavailable("offline".into())));
        store.fail_writes(None);
        assert!(store.alerts_by_author("u1", 5).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn recent_alerts_by_user__should_return_newest_first_and_bounded() {
        // Given
        let store = MemoryStore::new();
        let time = TestTime::at_millis(0);
        let sender = AlertSender::new(store.clone(), time.clone());
        for at in 1..=7 {
            time.set_millis(at);
            sender.send(AlertKind::Help, "u1", None).await.expect("send");
        }
        sender.send(AlertKind::Help, "u2", None).await.expect("send");

        // When
        let recent = recent_alerts_by_user(&store, "u1", 5).await;

        // Then
        let stamps: Vec<i64> = recent.iter().map(|alert| alert.created_at).collect();
        assert_eq!(stamps, vec![7, 6, 5, 4, 3]);
    }

    #[tokio::test]
    async fn recent_alerts_by_user__should_swallow_errors() {
        // Given
        let store = MemoryStore::new();
        store.fail_reads(Some(StoreError::Unavailable("offline".into())));

        // Then
        assert!(recent_alerts_by_user(&store, "u1", 5).await.is_empty());
    }
}

use tracing::{debug, error};

use crate::feed::{self, Feed};
use crate::ports::RecordStore;
use crate::types::UserRecord;

/// Live view of every known user.
///
/// Yields the full collection on first load and after every change. A
/// consumer that falls behind only sees the newest collection. A
/// subscription error yields an empty set instead of leaving stale users on
/// screen; the error itself is only logged.
pub fn watch_presence<S: RecordStore>(store: &S) -> Feed<Vec<UserRecord>> {
    feed::relay_latest(store.watch_users(), |snapshot| match snapshot {
        Ok(users) => {
            debug!(users = users.len(), "presence snapshot");
            Some(users)
        }
        Err(err) => {
            error!(%err, "presence subscription failed");
            Some(Vec::new())
        }
    })
}

/// Live view of a single user. `None` when the record is missing or the
/// subscription fails.
pub fn watch_user<S: RecordStore>(store: &S, uid: &str) -> Feed<Option<UserRecord>> {
    let uid = uid.to_string();
    feed::relay(store.watch_user(&uid), move |snapshot| match snapshot {
        Ok(user) => Some(user),
        Err(err) => {
            error!(%err, uid = %uid, "user subscription failed");
            Some(None)
        }
    })
}

pub async fn fetch_user<S: RecordStore>(store: &S, uid: &str) -> Option<UserRecord> {
    match store.user(uid).await {
        Ok(user) => user,
        Err(err) => {
            error!(%err, uid, "failed to fetch user");
            None
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::error::StoreError;
    use crate::types::{Coords, UserPatch};

    fn uids(users: &[UserRecord]) -> Vec<&str> {
        users.iter().map(|user| user.uid.as_str()).collect()
    }

    #[tokio::test]
    async fn watch_presence__should_mirror_collection_after_each_change() {
        // Given
        let store = MemoryStore::new();
        store.insert_user(UserRecord::new("a", "a@example.com"));
        let mut presence = watch_presence(&store);

        // Then
        assert_eq!(uids(&presence.recv().await.expect("initial")), vec!["a"]);

        // When
        store
            .merge_user("b", UserPatch::location(Coords::new(1.0, 1.0), 10))
            .await
            .expect("merge");

        // Then
        let users = presence.recv().await.expect("after insert");
        assert_eq!(uids(&users), vec!["a", "b"]);

        // When
        store
            .merge_user("a", UserPatch::location(Coords::new(2.0, 2.0), 20))
            .await
            .expect("merge");

        // Then
        let users = presence.recv().await.expect("after update");
        assert_eq!(uids(&users), vec!["a", "b"]);
        assert_eq!(users[0].coords, Some(Coords::new(2.0, 2.0)));

        // When
        store.remove_user("b");

        // Then
        assert_eq!(uids(&presence.recv().await.expect("after delete")), vec!["a"]);
    }

    #[tokio::test]
    async fn watch_presence__should_include_users_without_coords() {
        // Given
        let store = MemoryStore::new();
        store.insert_user(UserRecord::new("a", "a@example.com"));
        let mut located = UserRecord::new("b", "b@example.com");
        located.coords = Some(Coords::new(0.0, 0.0));
        store.insert_user(located);

        // When
        let users = watch_presence(&store).recv().await.expect("initial");

        // Then
        assert_eq!(users.len(), 2);
        assert!(!users[0].is_locatable());
        assert!(users[1].is_locatable());
    }

    #[tokio::test]
    async fn watch_presence__should_emit_empty_set_on_error() {
        // Given
        let store = MemoryStore::new();
        store.insert_user(UserRecord::new("a", "a@example.com"));
        let mut presence = watch_presence(&store);
        presence.recv().await.expect("initial");

        // When
        store.fail_subscriptions(StoreError::Unavailable("offline".into()));

        // Then
        assert_eq!(presence.recv().await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn watch_presence__should_stop_after_cancel() {
        // Given
        let store = MemoryStore::new();
        let mut presence = watch_presence(&store);
        presence.recv().await.expect("initial");
        let handle = presence.cancel_handle();

        // When
        handle.cancel();
        handle.cancel();
        store.insert_user(UserRecord::new("a", "a@example.com"));

        // Then
        assert_eq!(presence.recv().await, None);
    }

    #[tokio::test]
    async fn watch_user__should_report_missing_record_as_none() {
        // Given
        let store = MemoryStore::new();
        let mut feed = watch_user(&store, "ghost");

        // Then
        assert_eq!(feed.recv().await, Some(None));

        // When
        store.insert_user(UserRecord::new("ghost", "g@example.com"));

        // Then
        let user = feed.recv().await.expect("update").expect("user");
        assert_eq!(user.uid, "ghost");
    }

    #[tokio::test]
    async fn fetch_user__should_swallow_errors() {
        // Given
        let store = MemoryStore::new();
        store.insert_user(UserRecord::new("a", "a@example.com"));
        store.fail_reads(Some(StoreError::Unavailable("offline".into())));

        // Then
        assert_eq!(fetch_user(&store, "a").await, None);

        store.fail_reads(None);
        assert!(fetch_user(&store, "a").await.is_some());
    }
}

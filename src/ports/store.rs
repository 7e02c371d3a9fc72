use crate::error::StoreError;
use crate::feed::Feed;
use crate::types::{Alert, AlertWindowDelta, NewAlert, UserPatch, UserRecord};

/// The hosted record store holding user and alert documents.
///
/// Live subscriptions are opened synchronously and deliver their initial
/// state as the first event. Subscription errors arrive as `Err` events; the
/// feed stays open unless the store closes it.
pub trait RecordStore: Clone + Send + Sync + 'static {
    fn user<'a>(
        &'a self,
        uid: &'a str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send + 'a;

    /// Merge write: fields not set in `patch` keep their stored value. Creates
    /// the record when it does not exist.
    fn merge_user<'a>(
        &'a self,
        uid: &'a str,
        patch: UserPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a;

    fn watch_user(&self, uid: &str) -> Feed<Result<Option<UserRecord>, StoreError>>;

    /// Full contents of the user collection, re-sent after every change. A
    /// store may replace a snapshot the consumer has not read yet.
    fn watch_users(&self) -> Feed<Result<Vec<UserRecord>, StoreError>>;

    /// The `limit` most recent alerts by descending `createdAt`, as deltas.
    fn watch_alert_window(&self, limit: usize) -> Feed<Result<AlertWindowDelta, StoreError>>;

    /// One-shot query for an author's most recent alerts, newest first.
    fn alerts_by_author<'a>(
        &'a self,
        uid: &'a str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Alert>, StoreError>> + Send + 'a;

    /// Persists a new alert and returns the store-assigned id.
    fn create_alert<'a>(
        &'a self,
        alert: &'a NewAlert,
    ) -> impl Future<Output = Result<String, StoreError>> + Send + 'a;
}

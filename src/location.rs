use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::feed::{CancelHandle, Feed};
use crate::ports::{LocationService, RecordStore, SamplingPolicy, TimeProvider};
use crate::types::{Coords, Position, UserPatch};

/// Stops a running tracking loop. Stopping is permanent and idempotent.
#[derive(Debug, Clone)]
pub struct TrackingHandle {
    cancel: CancelHandle,
}

impl TrackingHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Publishes the device position into the local user's record.
#[derive(Debug, Clone)]
pub struct LocationPublisher<L, S, T> {
    location: L,
    store: S,
    time: T,
}

impl<L, S, T> LocationPublisher<L, S, T>
where
    L: LocationService,
    S: RecordStore,
    T: TimeProvider,
{
    pub fn new(location: L, store: S, time: T) -> Self {
        Self {
            location,
            store,
            time,
        }
    }

    /// Asks for foreground location access.
    pub async fn request_permission(&self) -> bool {
        self.location.request_permission().await.is_granted()
    }

    /// One-shot fix. Failures are logged and yield `None`.
    pub async fn current_location(&self) -> Option<Position> {
        match self.location.current_position().await {
            Ok(position) => Some(position),
            Err(err) => {
                error!(%err, "failed to get current location");
                None
            }
        }
    }

    /// Merge-writes `coords` and a fresh `updatedAt` into the user's record.
    pub async fn publish(&self, uid: &str, coords: Coords) -> Result<(), StoreError> {
        publish_location(&self.store, &self.time, uid, coords).await
    }

    /// Starts continuous tracking for `uid`.
    ///
    /// Returns `None` when location permission is not granted or the device
    /// refuses to start updates.
    pub async fn start_tracking(
        &self,
        uid: &str,
        policy: SamplingPolicy,
    ) -> Option<TrackingHandle> {
        if !self.request_permission().await {
            warn!(uid, "location permission denied; tracking disabled");
            return None;
        }

        let positions = match self.location.watch_position(policy) {
            Ok(positions) => positions,
            Err(err) => {
                error!(%err, uid, "failed to start location tracking");
                return None;
            }
        };

        let cancel = CancelHandle::new();
        let tracker = Tracker {
            location: self.location.clone(),
            store: self.store.clone(),
            time: self.time.clone(),
            uid: uid.to_string(),
            policy,
            stop: cancel.clone(),
        };
        tokio::spawn(tracker.run(positions));
        info!(
            uid,
            interval_ms = policy.interval.as_millis() as u64,
            min_distance_m = policy.min_distance_m,
            "location tracking started"
        );
        Some(TrackingHandle { cancel })
    }
}

async fn publish_location<S: RecordStore, T: TimeProvider>(
    store: &S,
    time: &T,
    uid: &str,
    coords: Coords,
) -> Result<(), StoreError> {
    store
        .merge_user(uid, UserPatch::location(coords, time.now_millis()))
        .await
}

struct Tracker<L, S, T> {
    location: L,
    store: S,
    time: T,
    uid: String,
    policy: SamplingPolicy,
    stop: CancelHandle,
}

impl<L, S, T> Tracker<L, S, T>
where
    L: LocationService,
    S: RecordStore,
    T: TimeProvider,
{
    async fn run(self, mut positions: Feed<Position>) {
        let mut last_published: Option<Position> = None;
        loop {
            let position = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                position = positions.recv() => position,
            };
            let Some(position) = position else {
                debug!(uid = %self.uid, "device location feed closed");
                break;
            };

            if !self.location.permission().await.is_granted() {
                warn!(uid = %self.uid, "location permission revoked; skipping update");
                continue;
            }
            if !self.policy.admits(last_published.as_ref(), &position) {
                continue;
            }
            if self.stop.is_cancelled() {
                break;
            }

            match publish_location(&self.store, &self.time, &self.uid, position.coords).await {
                Ok(()) => last_published = Some(position),
                Err(err) => error!(%err, uid = %self.uid, "failed to publish location"),
            }
        }
        debug!(uid = %self.uid, "location tracking stopped");
    }
}

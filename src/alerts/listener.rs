use tracing::{debug, error, info};

use crate::alerts::notifications::present_alert;
use crate::feed::{self, Feed, FeedSender};
use crate::ports::{Notifier, RecordStore, TimeProvider};
use crate::session::Session;
use crate::types::{Alert, AlertWindowDelta, ChangeKind};

/// Separates alerts replayed from the existing backlog from alerts that
/// arrived after the subscription was opened.
///
/// An added alert is live when the delta is not part of the backlog, or when
/// its `createdAt` is at or after the subscription start. The first delta of a
/// subscription always counts as backlog. Alerts written by the subscriber are
/// never live.
#[derive(Debug, Clone)]
pub(crate) struct LiveAlertFilter {
    subscriber: String,
    started_at: i64,
    first_delta: bool,
}

impl LiveAlertFilter {
    pub(crate) fn new(subscriber: &str, started_at: i64) -> Self {
        Self {
            subscriber: subscriber.to_string(),
            started_at,
            first_delta: true,
        }
    }

    pub(crate) fn admit(&mut self, delta: AlertWindowDelta) -> Vec<Alert> {
        let backlog = self.first_delta || delta.backlog;
        self.first_delta = false;

        delta
            .changes
            .into_iter()
            .filter(|change| change.kind == ChangeKind::Added)
            .map(|change| change.alert)
            .filter(|alert| alert.user_id != self.subscriber)
            .filter(|alert| {
                let live = !backlog || alert.created_at >= self.started_at;
                if !live {
                    debug!(
                        alert = %alert.id,
                        created_at = alert.created_at,
                        "skipping historical alert"
                    );
                }
                live
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AlertListener<S, N, T> {
    store: S,
    notifier: N,
    time: T,
    window: usize,
}

impl<S, N, T> AlertListener<S, N, T>
where
    S: RecordStore,
    N: Notifier,
    T: TimeProvider,
{
    pub fn new(store: S, notifier: N, time: T, window: usize) -> Self {
        Self {
            store,
            notifier,
            time,
            window,
        }
    }

    /// Opens the recent-alerts window and yields live alerts from other users,
    /// presenting a local notification for each one.
    pub fn listen(&self, session: &Session) -> Feed<Alert> {
        let filter = LiveAlertFilter::new(&session.uid, self.time.now_millis());
        let upstream = self.store.watch_alert_window(self.window);
        let (sender, feed) = feed::channel();
        let notifier = self.notifier.clone();
        tokio::spawn(run_listener(filter, upstream, notifier, sender));
        feed
    }
}

async fn run_listener<N: Notifier>(
    mut filter: LiveAlertFilter,
    mut upstream: Feed<Result<AlertWindowDelta, crate::error::StoreError>>,
    notifier: N,
    sender: FeedSender<Alert>,
) {
    loop {
        let delta = tokio::select! {
            biased;
            _ = sender.closed() => break,
            delta = upstream.recv() => delta,
        };
        let delta = match delta {
            Some(Ok(delta)) => delta,
            Some(Err(err)) => {
                error!(%err, "alert subscription failed");
                continue;
            }
            None => break,
        };

        for alert in filter.admit(delta) {
            if sender.is_closed() {
                return;
            }
            info!(alert = %alert.id, kind = %alert.kind, from = %alert.user_id, "live alert");
            present_alert(&notifier, &alert).await;
            if !sender.send(alert) {
                return;
            }
        }
    }
}

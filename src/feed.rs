//! Cancellable event streams.
//!
//! Every live subscription in the crate is a [`Feed`]: a stream of events
//! paired with a [`CancelHandle`]. Cancelling is idempotent, and once a feed is
//! cancelled it yields nothing more, even events that were already buffered.
//! Dropping a feed cancels it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

type Slot<T> = Arc<Mutex<Option<T>>>;

enum Inbox<T> {
    Queue(mpsc::UnboundedReceiver<T>),
    /// Holds only the newest event. The doorbell carries at most one wake-up.
    Latest {
        slot: Slot<T>,
        doorbell: mpsc::Receiver<()>,
    },
}

enum Outbox<T> {
    Queue(mpsc::UnboundedSender<T>),
    Latest {
        slot: Slot<T>,
        doorbell: mpsc::Sender<()>,
    },
}

pub struct Feed<T> {
    inbox: Inbox<T>,
    cancel: CancelHandle,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

pub struct FeedSender<T> {
    outbox: Outbox<T>,
    cancel: CancelHandle,
}

/// A feed that delivers every event in order.
pub fn channel<T>() -> (FeedSender<T>, Feed<T>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    pair(Outbox::Queue(sender), Inbox::Queue(receiver))
}

/// A feed that keeps only the newest undelivered event.
///
/// Suits snapshot streams, where a slow consumer only cares about the current
/// state. Buffered memory stays at one event however far the consumer lags.
pub fn latest<T>() -> (FeedSender<T>, Feed<T>) {
    let slot = Arc::new(Mutex::new(None));
    let (doorbell_sender, doorbell) = mpsc::channel(1);
    pair(
        Outbox::Latest {
            slot: slot.clone(),
            doorbell: doorbell_sender,
        },
        Inbox::Latest { slot, doorbell },
    )
}

fn pair<T>(outbox: Outbox<T>, inbox: Inbox<T>) -> (FeedSender<T>, Feed<T>) {
    let cancel = CancelHandle::new();
    let cancelled = Box::pin(cancel.token.clone().cancelled_owned());
    (
        FeedSender {
            outbox,
            cancel: cancel.clone(),
        },
        Feed {
            inbox,
            cancel,
            cancelled,
        },
    )
}

fn take<T>(slot: &Slot<T>) -> Option<T> {
    slot.lock().expect("feed slot lock").take()
}

impl<T> Feed<T> {
    /// Waits for the next event. `None` once the feed is cancelled or the
    /// producer has gone away.
    pub async fn recv(&mut self) -> Option<T> {
        futures_util::StreamExt::next(self).await
    }

    /// Returns a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        match &mut self.inbox {
            Inbox::Queue(receiver) => receiver.try_recv().ok(),
            Inbox::Latest { slot, .. } => take(slot),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Stream for Feed<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        match &mut this.inbox {
            Inbox::Queue(receiver) => receiver.poll_recv(cx),
            Inbox::Latest { slot, doorbell } => loop {
                match doorbell.poll_recv(cx) {
                    Poll::Ready(Some(())) => {
                        // Empty when try_recv already took the event.
                        if let Some(event) = take(slot) {
                            return Poll::Ready(Some(event));
                        }
                    }
                    Poll::Ready(None) => return Poll::Ready(take(slot)),
                    Poll::Pending => return Poll::Pending,
                }
            },
        }
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> std::fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<T> FeedSender<T> {
    /// Returns `false` when the feed is closed and the event was dropped.
    pub fn send(&self, event: T) -> bool {
        if self.is_closed() {
            return false;
        }
        match &self.outbox {
            Outbox::Queue(sender) => sender.send(event).is_ok(),
            Outbox::Latest { slot, doorbell } => {
                *slot.lock().expect("feed slot lock") = Some(event);
                !matches!(
                    doorbell.try_send(()),
                    Err(mpsc::error::TrySendError::Closed(()))
                )
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
            || match &self.outbox {
                Outbox::Queue(sender) => sender.is_closed(),
                Outbox::Latest { doorbell, .. } => doorbell.is_closed(),
            }
    }

    /// Resolves once the consumer cancels or drops the feed.
    pub async fn closed(&self) {
        let receiver_gone = async {
            match &self.outbox {
                Outbox::Queue(sender) => sender.closed().await,
                Outbox::Latest { doorbell, .. } => doorbell.closed().await,
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = receiver_gone => {}
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T> Clone for FeedSender<T> {
    fn clone(&self) -> Self {
        let outbox = match &self.outbox {
            Outbox::Queue(sender) => Outbox::Queue(sender.clone()),
            Outbox::Latest { slot, doorbell } => Outbox::Latest {
                slot: slot.clone(),
                doorbell: doorbell.clone(),
            },
        };
        Self {
            outbox,
            cancel: self.cancel.clone(),
        }
    }
}

/// Spawns a task that forwards `upstream` through `map` into a new feed.
///
/// Events for which `map` returns `None` are dropped. The task ends, and
/// releases `upstream`, when either side closes.
pub(crate) fn relay<U, T, F>(upstream: Feed<U>, map: F) -> Feed<T>
where
    U: Send + 'static,
    T: Send + 'static,
    F: FnMut(U) -> Option<T> + Send + 'static,
{
    spawn_relay(upstream, map, channel())
}

/// Like [`relay`], but the new feed only keeps the newest event.
pub(crate) fn relay_latest<U, T, F>(upstream: Feed<U>, map: F) -> Feed<T>
where
    U: Send + 'static,
    T: Send + 'static,
    F: FnMut(U) -> Option<T> + Send + 'static,
{
    spawn_relay(upstream, map, latest())
}

fn spawn_relay<U, T, F>(
    mut upstream: Feed<U>,
    mut map: F,
    (sender, feed): (FeedSender<T>, Feed<T>),
) -> Feed<T>
where
    U: Send + 'static,
    T: Send + 'static,
    F: FnMut(U) -> Option<T> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = sender.closed() => break,
                event = upstream.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            if let Some(mapped) = map(event)
                && !sender.send(mapped)
            {
                break;
            }
        }
    });
    feed
}

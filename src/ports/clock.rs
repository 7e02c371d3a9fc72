use std::time::Duration;

use time::OffsetDateTime;

pub trait TimeProvider: Clone + Send + Sync + 'static {
    type Sleep<'a>: Future<Output = ()> + Send + 'a
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime;
    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a>;

    fn now_millis(&self) -> i64 {
        unix_millis(self.now())
    }
}

/// Milliseconds since the unix epoch, the unit used for record timestamps.
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

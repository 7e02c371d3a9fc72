use std::future::{Ready, ready};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::OffsetDateTime;

use crate::ports;

/// A manual clock. Sleeping completes immediately and advances it.
#[derive(Debug, Clone)]
pub(crate) struct TestTime {
    now: Arc<Mutex<OffsetDateTime>>,
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl TestTime {
    pub(crate) fn at_millis(millis: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(from_millis(millis))),
            slept: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn set_millis(&self, millis: i64) {
        *self.now.lock().expect("test time lock") = from_millis(millis);
    }

    pub(crate) fn slept(&self) -> Vec<Duration> {
        self.slept.lock().expect("slept lock").clone()
    }
}

fn from_millis(millis: i64) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + time::Duration::milliseconds(millis)
}

impl ports::TimeProvider for TestTime {
    type Sleep<'a>
        = Ready<()>
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("test time lock")
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        self.slept.lock().expect("slept lock").push(duration);
        let mut now = self.now.lock().expect("test time lock");
        *now += duration;
        ready(())
    }
}

use std::time::Duration;

use crate::error::LocationError;
use crate::feed::Feed;
use crate::types::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// How often tracked positions are published.
///
/// An update qualifies once at least `interval` has passed and the device has
/// moved at least `min_distance_m` since the last published fix. A zero value
/// disables that threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    pub interval: Duration,
    pub min_distance_m: f64,
}

impl SamplingPolicy {
    pub fn admits(&self, last: Option<&Position>, next: &Position) -> bool {
        let Some(last) = last else {
            return true;
        };
        let elapsed_ms = next.timestamp_ms.saturating_sub(last.timestamp_ms);
        let interval_ms = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
        if elapsed_ms < interval_ms {
            return false;
        }
        last.coords.distance_m(&next.coords) >= self.min_distance_m
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            min_distance_m: 10.0,
        }
    }
}

pub trait LocationService: Clone + Send + Sync + 'static {
    fn permission(&self) -> impl Future<Output = PermissionStatus> + Send + '_;

    /// Asks the user for foreground location access.
    fn request_permission(&self) -> impl Future<Output = PermissionStatus> + Send + '_;

    /// One-shot high accuracy fix.
    fn current_position(&self) -> impl Future<Output = Result<Position, LocationError>> + Send + '_;

    /// Continuous updates. The policy is a hint; services may report more
    /// often than it asks for.
    fn watch_position(&self, policy: SamplingPolicy) -> Result<Feed<Position>, LocationError>;
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::types::Coords;

    fn position(north_m: f64, at: i64) -> Position {
        Position::new(Coords::new(-23.5505, -46.6333).offset_m(north_m, 0.0), at)
    }

    #[test]
    fn admits__should_accept_first_fix() {
        let policy = SamplingPolicy::default();

        assert!(policy.admits(None, &position(0.0, 0)));
    }

    #[test]
    fn admits__should_require_both_interval_and_distance() {
        // Given
        let policy = SamplingPolicy::default();
        let last = position(0.0, 0);

        // Then
        assert!(!policy.admits(Some(&last), &position(50.0, 1_000)));
        assert!(!policy.admits(Some(&last), &position(5.0, 6_000)));
        assert!(policy.admits(Some(&last), &position(50.0, 5_000)));
    }

    #[test]
    fn admits__should_treat_zero_thresholds_as_disabled() {
        // Given
        let policy = SamplingPolicy {
            interval: Duration::ZERO,
            min_distance_m: 0.0,
        };
        let last = position(0.0, 10);

        // Then
        assert!(policy.admits(Some(&last), &position(0.0, 10)));
    }
}

//! Detects an audio source that has stopped delivering samples.
//!
//! Every frame carries the source's running sample count.  When that count
//! has not moved for longer than the grace period the stream is considered
//! stalled; past the timeout the engine gives up on it.

use std::time::Duration;

use tokio::time::Instant;

/// Result of observing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallStatus {
    /// New samples arrived within the grace period.
    Flowing,
    /// No new samples for the contained duration (longer than the grace).
    Stalled(Duration),
    /// No new samples for at least the timeout.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct StallDetector {
    grace: Duration,
    timeout: Option<Duration>,
    last: Option<(u64, Instant)>,
}

impl StallDetector {
    /// `timeout` of `None` never times out.
    pub fn new(grace: Duration, timeout: Option<Duration>) -> Self {
        Self {
            grace,
            timeout,
            last: None,
        }
    }

    pub fn observe(&mut self, sequence: u64, now: Instant) -> StallStatus {
        match self.last {
            Some((previous, since)) if previous == sequence => {
                let idle = now.saturating_duration_since(since);
                if self.timeout.is_some_and(|t| idle >= t) {
                    StallStatus::TimedOut
                } else if idle > self.grace {
                    StallStatus::Stalled(idle)
                } else {
                    StallStatus::Flowing
                }
            }
            _ => {
                self.last = Some((sequence, now));
                StallStatus::Flowing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(1_000);

    #[test]
    fn advancing_sequence_is_flowing() {
        let start = Instant::now();
        let mut d = StallDetector::new(GRACE, None);
        for i in 0..100u64 {
            let now = start + Duration::from_millis(i * 100);
            assert_eq!(d.observe(i * 512, now), StallStatus::Flowing);
        }
    }

    #[test]
    fn frozen_sequence_stalls_after_grace() {
        let start = Instant::now();
        let mut d = StallDetector::new(GRACE, None);
        assert_eq!(d.observe(7, start), StallStatus::Flowing);
        assert_eq!(d.observe(7, start + GRACE), StallStatus::Flowing);

        let later = start + GRACE + Duration::from_millis(1);
        assert!(matches!(d.observe(7, later), StallStatus::Stalled(_)));
    }

    #[test]
    fn resumes_when_sequence_moves() {
        let start = Instant::now();
        let mut d = StallDetector::new(GRACE, None);
        d.observe(7, start);
        let later = start + Duration::from_secs(5);
        assert!(matches!(d.observe(7, later), StallStatus::Stalled(_)));
        assert_eq!(d.observe(8, later), StallStatus::Flowing);
        assert_eq!(d.observe(8, later + GRACE), StallStatus::Flowing);
    }

    #[test]
    fn times_out() {
        let start = Instant::now();
        let mut d = StallDetector::new(GRACE, Some(Duration::from_secs(30)));
        d.observe(1, start);
        assert!(matches!(
            d.observe(1, start + Duration::from_secs(29)),
            StallStatus::Stalled(_)
        ));
        assert_eq!(
            d.observe(1, start + Duration::from_secs(30)),
            StallStatus::TimedOut
        );
    }
}

//! Rolling pitch history and the stability score derived from it.

use crate::audio::RingBuffer;

use super::pitch::PitchSample;

/// Default number of pitch samples kept.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Tracks the most recent pitch estimates and scores how steady they are.
///
/// Stability is `max(0, 100 − σ/10)` where σ is the population standard
/// deviation of the stored samples in cents.  A σ of 1000 cents or more
/// scores 0; identical samples score 100.  With fewer than two samples the
/// score is 0.
///
/// ```rust
/// use vocal_coach::analysis::StabilityTracker;
///
/// let mut tracker = StabilityTracker::default();
/// assert_eq!(tracker.stability(), 0.0);
/// tracker.push(0.0);
/// tracker.push(0.0);
/// assert_eq!(tracker.stability(), 100.0);
/// ```
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    history: RingBuffer<f64>,
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl StabilityTracker {
    /// Tracker over the last `capacity` samples (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            history: RingBuffer::new(capacity.max(1)),
        }
    }

    /// Record one estimate, evicting the oldest beyond capacity.
    /// Non-finite input is stored as `0.0`.
    pub fn push(&mut self, sample: PitchSample) {
        self.history
            .push(if sample.is_finite() { sample } else { 0.0 });
    }

    /// Stability score in `0.0..=100.0`.
    pub fn stability(&self) -> f64 {
        let n = self.history.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.history.iter().sum::<f64>() / n as f64;
        let variance = self
            .history
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        (100.0 - variance.sqrt() / 10.0).clamp(0.0, 100.0)
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Stored samples, oldest first.
    pub fn samples(&self) -> Vec<PitchSample> {
        self.history.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_samples_scores_zero() {
        let mut t = StabilityTracker::default();
        assert_eq!(t.stability(), 0.0);
        t.push(120.0);
        assert_eq!(t.stability(), 0.0);
    }

    #[test]
    fn constant_pitch_is_fully_stable() {
        let mut t = StabilityTracker::default();
        for _ in 0..10 {
            t.push(-350.0);
        }
        assert_eq!(t.stability(), 100.0);
    }

    #[test]
    fn population_standard_deviation() {
        // mean 0, σ = 100 → 100 − 10 = 90
        let mut t = StabilityTracker::default();
        t.push(100.0);
        t.push(-100.0);
        assert!((t.stability() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn huge_spread_floors_at_zero() {
        let mut t = StabilityTracker::default();
        t.push(3000.0);
        t.push(-3000.0);
        assert_eq!(t.stability(), 0.0);
    }

    #[test]
    fn more_dispersion_never_scores_higher() {
        let mut last = f64::INFINITY;
        for spread in [0.0, 10.0, 50.0, 200.0, 800.0, 2000.0] {
            let mut t = StabilityTracker::default();
            for i in 0..10 {
                t.push(if i % 2 == 0 { spread } else { -spread });
            }
            let score = t.stability();
            assert!(score <= last, "spread {spread}: {score} > {last}");
            last = score;
        }
    }

    #[test]
    fn history_is_bounded_and_fifo() {
        let mut t = StabilityTracker::new(10);
        for i in 0..25 {
            t.push(i as f64);
        }
        assert_eq!(t.len(), 10);
        assert_eq!(t.samples(), (15..25).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn non_finite_samples_are_zeroed() {
        let mut t = StabilityTracker::default();
        t.push(f64::NAN);
        t.push(f64::NEG_INFINITY);
        assert_eq!(t.samples(), vec![0.0, 0.0]);
        assert_eq!(t.stability(), 100.0);
    }

    #[test]
    fn reset_empties_history() {
        let mut t = StabilityTracker::default();
        t.push(1.0);
        t.push(2.0);
        t.reset();
        assert!(t.is_empty());
        assert_eq!(t.stability(), 0.0);
        assert_eq!(t.capacity(), 10);
    }
}

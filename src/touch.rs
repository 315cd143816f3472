//! Per-electrode edge detection with time-based debounce
//!
//! A [`TouchEdgeTracker`] turns the raw touched/untouched sample of one
//! electrode into debounced rising and falling edges. The raw reading must
//! hold steady for the whole debounce interval before the debounced state
//! follows it, so a bounce shorter than the interval never produces an edge.

use std::time::{Duration, Instant};

/// Debounced transition of one electrode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEvent {
    /// Untouched -> touched
    RisingEdge,
    /// Touched -> untouched
    FallingEdge,
}

/// Debounced edge tracker for a single sensor pin
#[derive(Debug, Clone)]
pub struct TouchEdgeTracker {
    raw_state: bool,
    debounced_state: bool,
    /// When `raw_state` last changed; `None` until the first change
    last_change_time: Option<Instant>,
    debounce_interval: Duration,
}

impl TouchEdgeTracker {
    /// Create a tracker in the untouched state
    pub fn new(debounce_interval: Duration) -> Self {
        Self {
            raw_state: false,
            debounced_state: false,
            last_change_time: None,
            debounce_interval,
        }
    }

    /// Feed one raw sample taken at `now`
    ///
    /// Returns an edge on the tick the debounced state commits to a new value.
    pub fn sample(&mut self, raw: bool, now: Instant) -> Option<EdgeEvent> {
        if raw != self.raw_state {
            self.raw_state = raw;
            self.last_change_time = Some(now);
        }

        if self.raw_state == self.debounced_state {
            return None;
        }

        let stable_since = self.last_change_time?;
        if now.saturating_duration_since(stable_since) < self.debounce_interval {
            return None;
        }

        self.debounced_state = self.raw_state;
        Some(if self.debounced_state {
            EdgeEvent::RisingEdge
        } else {
            EdgeEvent::FallingEdge
        })
    }

    /// Current debounced state
    pub fn is_touched(&self) -> bool {
        self.debounced_state
    }

    /// Current raw (undebounced) state
    pub fn raw_state(&self) -> bool {
        self.raw_state
    }

    /// Force the tracker back to untouched without emitting an edge.
    ///
    /// Used after a sensor re-calibration, when the electrode baseline is
    /// reset and any in-flight touch reading is meaningless.
    pub fn reset(&mut self) {
        self.raw_state = false;
        self.debounced_state = false;
        self.last_change_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEBOUNCE: Duration = Duration::from_millis(100);

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn test_rising_edge_after_interval() {
        let t0 = Instant::now();
        let mut tracker = TouchEdgeTracker::new(DEBOUNCE);

        assert_eq!(tracker.sample(true, t0), None);
        assert_eq!(tracker.sample(true, ms(t0, 50)), None);
        assert_eq!(tracker.sample(true, ms(t0, 99)), None);
        assert!(!tracker.is_touched());
        assert!(tracker.raw_state());

        assert_eq!(tracker.sample(true, ms(t0, 100)), Some(EdgeEvent::RisingEdge));
        assert!(tracker.is_touched());

        // No repeated edge while held
        assert_eq!(tracker.sample(true, ms(t0, 200)), None);
    }

    #[test]
    fn test_falling_edge_after_interval() {
        let t0 = Instant::now();
        let mut tracker = TouchEdgeTracker::new(DEBOUNCE);
        tracker.sample(true, t0);
        tracker.sample(true, ms(t0, 100));

        assert_eq!(tracker.sample(false, ms(t0, 300)), None);
        assert_eq!(tracker.sample(false, ms(t0, 399)), None);
        assert_eq!(tracker.sample(false, ms(t0, 400)), Some(EdgeEvent::FallingEdge));
        assert!(!tracker.is_touched());
    }

    #[test]
    fn test_bounce_restarts_timer() {
        let t0 = Instant::now();
        let mut tracker = TouchEdgeTracker::new(DEBOUNCE);

        tracker.sample(true, t0);
        tracker.sample(false, ms(t0, 60)); // bounce
        tracker.sample(true, ms(t0, 80));

        // 100ms after the first touch, but only 20ms after the last change
        assert_eq!(tracker.sample(true, ms(t0, 100)), None);
        assert_eq!(tracker.sample(true, ms(t0, 180)), Some(EdgeEvent::RisingEdge));
    }

    #[test]
    fn test_reset_clears_state_silently() {
        let t0 = Instant::now();
        let mut tracker = TouchEdgeTracker::new(DEBOUNCE);
        tracker.sample(true, t0);
        tracker.sample(true, ms(t0, 100));
        assert!(tracker.is_touched());

        tracker.reset();
        assert!(!tracker.is_touched());
        assert!(!tracker.raw_state());

        // Still touched after reset: needs a full interval again
        assert_eq!(tracker.sample(true, ms(t0, 110)), None);
        assert_eq!(tracker.sample(true, ms(t0, 210)), Some(EdgeEvent::RisingEdge));
    }

    #[test]
    fn test_zero_interval_commits_immediately() {
        let t0 = Instant::now();
        let mut tracker = TouchEdgeTracker::new(Duration::ZERO);
        assert_eq!(tracker.sample(true, t0), Some(EdgeEvent::RisingEdge));
        assert_eq!(tracker.sample(false, t0), Some(EdgeEvent::FallingEdge));
    }

    proptest! {
        /// Any sample sequence spanning less than the debounce interval
        /// never produces an edge.
        #[test]
        fn prop_short_sequences_never_emit(
            samples in prop::collection::vec((any::<bool>(), 0u64..10), 1..40)
        ) {
            let t0 = Instant::now();
            let mut tracker = TouchEdgeTracker::new(DEBOUNCE);
            let mut offset = 0u64;

            for (raw, step) in samples {
                offset += step;
                if offset >= DEBOUNCE.as_millis() as u64 {
                    break;
                }
                prop_assert_eq!(tracker.sample(raw, ms(t0, offset)), None);
            }
            prop_assert!(!tracker.is_touched());
        }

        /// Edges strictly alternate, starting with a rising edge.
        #[test]
        fn prop_edges_alternate(
            samples in prop::collection::vec((any::<bool>(), 0u64..250), 1..80)
        ) {
            let t0 = Instant::now();
            let mut tracker = TouchEdgeTracker::new(DEBOUNCE);
            let mut offset = 0u64;
            let mut expect_rising = true;

            for (raw, step) in samples {
                offset += step;
                if let Some(edge) = tracker.sample(raw, ms(t0, offset)) {
                    let expected = if expect_rising { EdgeEvent::RisingEdge } else { EdgeEvent::FallingEdge };
                    prop_assert_eq!(edge, expected);
                    expect_rising = !expect_rising;
                }
            }
        }
    }
}

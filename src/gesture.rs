//! Collective "all both-press" toggle
//!
//! When every slider is held in both-press for `stable_time`, a toggle CC is
//! switched on. It stays on for at least `min_duration` (even if everyone
//! lets go straight away), is forced off after `max_duration`, and cannot
//! fire again until `cooldown` has passed since it switched off.
//!
//! State machine:
//!
//! ```text
//!   Idle ──all held──▶ Accumulating ──held ≥ stable──▶ Active
//!    ▲                     │                              │
//!    └──────released───────┘          ≥ max, or released after ≥ min
//!    ▲                                                    ▼
//!    └─────────────── cooldown expired ◀─────────────── Cooldown
//! ```
//!
//! A gesture started during cooldown is remembered; when the cooldown
//! expires it is evaluated straight away with its original start time, so a
//! gesture already held for `stable_time` fires on the expiry tick.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::AllBothPressConfig;
use crate::error::ConfigError;
use crate::event::OutputEvent;

/// Aggregator state; each variant carries the one timestamp it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    /// All sliders held since `since`, not yet for `stable_time`
    Accumulating { since: Instant },
    /// Toggle is on since `since`
    Active { since: Instant },
    /// Toggle is off; re-arming is blocked until `until`
    Cooldown {
        until: Instant,
        /// Start of a collective hold that began during the cooldown
        pending: Option<Instant>,
    },
}

impl GestureState {
    pub fn name(&self) -> &'static str {
        match self {
            GestureState::Idle => "idle",
            GestureState::Accumulating { .. } => "accumulating",
            GestureState::Active { .. } => "active",
            GestureState::Cooldown { .. } => "cooldown",
        }
    }
}

/// Aggregator summary for logs and status reports
#[derive(Debug, Clone, Serialize)]
pub struct GestureStatus {
    pub enabled: bool,
    pub cc: u8,
    pub state: &'static str,
    pub stable_time_ms: u128,
    pub min_duration_ms: u128,
    pub max_duration_ms: u128,
    pub cooldown_ms: u128,
}

/// Timing parameters of the toggle
#[derive(Debug, Clone, Copy)]
struct GestureTimings {
    stable_time: Duration,
    min_duration: Duration,
    max_duration: Duration,
    cooldown: Duration,
}

/// Watches the both-press state of all sliders and drives the toggle CC
#[derive(Debug)]
pub struct CollectiveGestureAggregator {
    enabled: bool,
    cc: u8,
    timings: GestureTimings,
    state: GestureState,
}

impl CollectiveGestureAggregator {
    /// Create an aggregator in the idle state
    pub fn new(config: &AllBothPressConfig) -> Result<Self, ConfigError> {
        if config.enabled {
            config.validate()?;
            info!("All Both-Press Toggle enabled (CC {})", config.cc);
            info!(
                "  Stable time: {:?}, Min duration: {:?}, Max duration: {:?}, Cooldown: {:?}",
                config.stable_time(),
                config.min_duration(),
                config.max_duration(),
                config.cooldown()
            );
        } else {
            info!("All Both-Press Toggle disabled");
        }

        Ok(Self {
            enabled: config.enabled,
            cc: config.cc,
            timings: GestureTimings {
                stable_time: config.stable_time(),
                min_duration: config.min_duration(),
                max_duration: config.max_duration(),
                cooldown: config.cooldown(),
            },
            state: GestureState::Idle,
        })
    }

    /// Evaluate one tick. `collective_both` is true when every participating
    /// slider is in both-press.
    pub fn tick(&mut self, now: Instant, collective_both: bool) -> Option<OutputEvent> {
        if !self.enabled {
            return None;
        }

        match self.state {
            GestureState::Idle => {
                if collective_both {
                    debug!("All sliders entered both-press state - starting stable timer");
                    self.state = GestureState::Accumulating { since: now };
                }
                None
            }

            GestureState::Accumulating { since } => {
                if collective_both {
                    self.try_activate(since, now)
                } else {
                    debug!("At least one slider left both-press state - resetting stable timer");
                    self.state = GestureState::Idle;
                    None
                }
            }

            GestureState::Active { since } => {
                let active_for = now.saturating_duration_since(since);
                let expired = active_for >= self.timings.max_duration;
                let released = !collective_both && active_for >= self.timings.min_duration;

                if !(expired || released) {
                    return None;
                }

                self.state = GestureState::Cooldown {
                    until: now + self.timings.cooldown,
                    pending: collective_both.then_some(now),
                };
                info!(
                    "All Both-Press Toggle DEACTIVATED (CC {}) after {:?}{}",
                    self.cc,
                    active_for,
                    if expired { " (max duration)" } else { "" }
                );
                Some(OutputEvent::ToggleOff { cc: self.cc })
            }

            GestureState::Cooldown { until, pending } => {
                let pending = if collective_both {
                    pending.or(Some(now))
                } else {
                    None
                };

                if now < until {
                    self.state = GestureState::Cooldown { until, pending };
                    return None;
                }

                match pending {
                    Some(since) => {
                        self.state = GestureState::Accumulating { since };
                        self.try_activate(since, now)
                    }
                    None => {
                        self.state = GestureState::Idle;
                        None
                    }
                }
            }
        }
    }

    fn try_activate(&mut self, since: Instant, now: Instant) -> Option<OutputEvent> {
        if now.saturating_duration_since(since) < self.timings.stable_time {
            return None;
        }

        self.state = GestureState::Active { since: now };
        info!("All Both-Press Toggle ACTIVATED (CC {})", self.cc);
        Some(OutputEvent::ToggleOn { cc: self.cc })
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// True while the toggle CC is on
    pub fn is_active(&self) -> bool {
        matches!(self.state, GestureState::Active { .. })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cc(&self) -> u8 {
        self.cc
    }

    pub fn status(&self) -> GestureStatus {
        GestureStatus {
            enabled: self.enabled,
            cc: self.cc,
            state: self.state.name(),
            stable_time_ms: self.timings.stable_time.as_millis(),
            min_duration_ms: self.timings.min_duration.as_millis(),
            max_duration_ms: self.timings.max_duration.as_millis(),
            cooldown_ms: self.timings.cooldown.as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CC: u8 = 110;

    fn config() -> AllBothPressConfig {
        AllBothPressConfig {
            enabled: true,
            cc: CC,
            stable_time_ms: 3_000,
            min_duration_ms: 10_000,
            max_duration_ms: 30_000,
            cooldown_ms: 5_000,
        }
    }

    fn aggregator() -> CollectiveGestureAggregator {
        CollectiveGestureAggregator::new(&config()).unwrap()
    }

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    /// Tick every 10ms over [from, to), returning (time_ms, event) pairs
    fn drive(
        agg: &mut CollectiveGestureAggregator,
        t0: Instant,
        from: u64,
        to: u64,
        held: bool,
    ) -> Vec<(u64, OutputEvent)> {
        (from..to)
            .step_by(10)
            .filter_map(|ms| agg.tick(at(t0, ms), held).map(|e| (ms, e)))
            .collect()
    }

    #[test]
    fn test_rejects_min_above_max() {
        let mut cfg = config();
        cfg.min_duration_ms = 31_000;
        assert!(CollectiveGestureAggregator::new(&cfg).is_err());
    }

    #[test]
    fn test_disabled_ignores_stale_timings() {
        let mut cfg = config();
        cfg.enabled = false;
        cfg.min_duration_ms = 40_000;
        cfg.cc = 200;

        let agg = CollectiveGestureAggregator::new(&cfg).unwrap();
        assert!(!agg.is_enabled());
    }

    #[test]
    fn test_toggle_on_exactly_at_stable_time() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        assert!(drive(&mut agg, t0, 0, 2_990, true).is_empty());
        assert!(matches!(agg.state(), GestureState::Accumulating { .. }));
        assert_eq!(agg.tick(at(t0, 2_999), true), None);
        assert_eq!(agg.tick(at(t0, 3_000), true), Some(OutputEvent::ToggleOn { cc: CC }));
        assert!(agg.is_active());
    }

    #[test]
    fn test_blip_below_stable_time_never_fires() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        assert!(drive(&mut agg, t0, 0, 2_000, true).is_empty());
        assert!(drive(&mut agg, t0, 2_000, 2_100, false).is_empty());
        assert_eq!(agg.state(), GestureState::Idle);

        // Restarting the hold restarts the timer
        assert!(drive(&mut agg, t0, 2_100, 5_000, true).is_empty());
        assert_eq!(agg.tick(at(t0, 5_100), true), Some(OutputEvent::ToggleOn { cc: CC }));
    }

    #[test]
    fn test_minimum_hold_after_early_release() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        assert_eq!(agg.tick(at(t0, 3_000), true), Some(OutputEvent::ToggleOn { cc: CC }));

        // Released at t=5s; must stay on until 10s after activation
        assert!(drive(&mut agg, t0, 3_010, 5_000, true).is_empty());
        assert!(drive(&mut agg, t0, 5_000, 13_000, false).is_empty());
        assert!(agg.is_active());
        assert_eq!(agg.tick(at(t0, 13_000), false), Some(OutputEvent::ToggleOff { cc: CC }));
        assert!(matches!(agg.state(), GestureState::Cooldown { .. }));
    }

    #[test]
    fn test_held_past_min_stays_on() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        agg.tick(at(t0, 3_000), true);

        assert!(drive(&mut agg, t0, 3_010, 20_000, true).is_empty());
        assert!(agg.is_active());
        assert_eq!(agg.tick(at(t0, 20_000), false), Some(OutputEvent::ToggleOff { cc: CC }));
    }

    #[test]
    fn test_max_duration_cap() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        agg.tick(at(t0, 3_000), true);

        assert!(drive(&mut agg, t0, 3_010, 33_000, true).is_empty());
        assert_eq!(agg.tick(at(t0, 33_000), true), Some(OutputEvent::ToggleOff { cc: CC }));
    }

    #[test]
    fn test_cooldown_defers_pending_gesture() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        agg.tick(at(t0, 3_000), true);
        assert!(drive(&mut agg, t0, 3_010, 13_000, false).is_empty());
        // ToggleOff at T = 13s, cooldown until 18s
        assert_eq!(agg.tick(at(t0, 13_000), false), Some(OutputEvent::ToggleOff { cc: CC }));

        // New gesture from T+1s, held past stable time inside the cooldown
        assert!(drive(&mut agg, t0, 13_010, 14_000, false).is_empty());
        assert!(drive(&mut agg, t0, 14_000, 18_000, true).is_empty());
        assert!(!agg.is_active());

        // Fires on the tick the cooldown expires
        assert_eq!(agg.tick(at(t0, 18_000), true), Some(OutputEvent::ToggleOn { cc: CC }));
    }

    #[test]
    fn test_cooldown_pending_still_needs_stable_time() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        agg.tick(at(t0, 3_000), true);
        agg.tick(at(t0, 13_000), false); // off, cooldown until 18s

        // Gesture starts at 17s: only 1s held when the cooldown ends
        assert!(drive(&mut agg, t0, 17_000, 18_010, true).is_empty());
        assert_eq!(agg.state(), GestureState::Accumulating { since: at(t0, 17_000) });
        assert_eq!(agg.tick(at(t0, 20_000), true), Some(OutputEvent::ToggleOn { cc: CC }));
    }

    #[test]
    fn test_cooldown_released_gesture_is_forgotten() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        agg.tick(at(t0, 3_000), true);
        agg.tick(at(t0, 13_000), false);

        agg.tick(at(t0, 14_000), true);
        agg.tick(at(t0, 15_000), false);
        assert_eq!(agg.tick(at(t0, 18_000), false), None);
        assert_eq!(agg.state(), GestureState::Idle);
    }

    #[test]
    fn test_continuous_hold_refires_after_cooldown() {
        let t0 = Instant::now();
        let mut agg = aggregator();

        agg.tick(at(t0, 0), true);
        agg.tick(at(t0, 3_000), true);
        assert_eq!(agg.tick(at(t0, 33_000), true), Some(OutputEvent::ToggleOff { cc: CC }));

        // Still held: pending since 33s, cooldown until 38s, 5s >= stable
        assert_eq!(agg.tick(at(t0, 37_990), true), None);
        assert_eq!(agg.tick(at(t0, 38_000), true), Some(OutputEvent::ToggleOn { cc: CC }));
    }

    #[test]
    fn test_disabled_never_emits() {
        let mut cfg = config();
        cfg.enabled = false;
        let mut agg = CollectiveGestureAggregator::new(&cfg).unwrap();
        let t0 = Instant::now();

        assert!(drive(&mut agg, t0, 0, 40_000, true).is_empty());
        assert!(!agg.is_enabled());
        assert_eq!(agg.state(), GestureState::Idle);
    }

    #[test]
    fn test_status_summary() {
        let t0 = Instant::now();
        let mut agg = aggregator();
        agg.tick(t0, true);

        let status = agg.status();
        assert!(status.enabled);
        assert_eq!(status.cc, CC);
        assert_eq!(status.state, "accumulating");
        assert_eq!(status.stable_time_ms, 3_000);
        assert_eq!(status.cooldown_ms, 5_000);
    }

    #[test]
    fn test_state_names() {
        let t0 = Instant::now();
        assert_eq!(GestureState::Idle.name(), "idle");
        assert_eq!(GestureState::Accumulating { since: t0 }.name(), "accumulating");
        assert_eq!(GestureState::Active { since: t0 }.name(), "active");
        assert_eq!(GestureState::Cooldown { until: t0, pending: None }.name(), "cooldown");
    }
}

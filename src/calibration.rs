//! Sensor re-calibration scheduling
//!
//! Stage lighting that comes up with the show shifts the electrode baselines,
//! so the boards are re-calibrated once, a fixed delay after the first MIDI
//! message from the host. Independently, boards are health-checked periodically.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CalibrationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationAction {
    Recalibrate,
    HealthCheck,
}

#[derive(Debug)]
pub struct CalibrationScheduler {
    startup_enabled: bool,
    startup_delay: Duration,
    first_midi: Option<Instant>,
    startup_done: bool,
    health_interval: Option<Duration>,
    next_health_check: Option<Instant>,
}

impl CalibrationScheduler {
    pub fn new(config: &CalibrationConfig, now: Instant) -> Self {
        let health_interval = config.health_check_interval();
        Self {
            startup_enabled: config.startup_enabled,
            startup_delay: config.startup_delay(),
            first_midi: None,
            startup_done: !config.startup_enabled,
            health_interval,
            next_health_check: health_interval.map(|interval| now + interval),
        }
    }

    /// Note an inbound MIDI message; only the first one matters
    pub fn on_midi_received(&mut self, now: Instant) {
        if self.first_midi.is_some() || !self.startup_enabled {
            return;
        }
        self.first_midi = Some(now);
        info!(
            "First MIDI message received - sensor re-calibration in {:?}",
            self.startup_delay
        );
    }

    /// Actions due at `now`
    pub fn poll(&mut self, now: Instant) -> Vec<CalibrationAction> {
        let mut due = Vec::new();

        if !self.startup_done {
            if let Some(first) = self.first_midi {
                if now.saturating_duration_since(first) >= self.startup_delay {
                    self.startup_done = true;
                    info!("Startup calibration delay elapsed");
                    due.push(CalibrationAction::Recalibrate);
                }
            }
        }

        if let (Some(interval), Some(next)) = (self.health_interval, self.next_health_check) {
            if now >= next {
                debug!("Sensor health check due");
                self.next_health_check = Some(now + interval);
                due.push(CalibrationAction::HealthCheck);
            }
        }

        due
    }

    /// True once the startup re-calibration has run (or is disabled)
    pub fn startup_done(&self) -> bool {
        self.startup_done
    }
}

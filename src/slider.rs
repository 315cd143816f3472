//! Touch slider controller
//!
//! A slider is a pair of electrodes: touching "down" lowers the value,
//! touching "up" raises it, touching both acts as a momentary button. Holding
//! one electrode ramps the step size up with the hold time. The controller
//! never talks to MIDI directly; [`SliderController::tick`] returns the
//! events to deliver.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::{SliderConfig, MIDI_MAX};
use crate::error::ConfigError;
use crate::event::OutputEvent;
use crate::touch::TouchEdgeTracker;

/// What a slider's electrodes are doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SliderStatus {
    Up,
    Down,
    Both,
    Idle,
}

impl SliderStatus {
    /// One-letter code used on the status display
    pub fn code(&self) -> &'static str {
        match self {
            SliderStatus::Up => "U",
            SliderStatus::Down => "D",
            SliderStatus::Both => "B",
            SliderStatus::Idle => "",
        }
    }
}

/// Read-only view of a slider handed to the display each tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliderSnapshot {
    pub slider_index: usize,
    pub cc_number: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_cc: Option<u8>,
    pub value: u8,
    pub status: SliderStatus,
    /// False when the slider's sensor board is absent
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Down,
    Up,
}

/// A continuous single-direction press
#[derive(Debug, Clone, Copy)]
struct Press {
    direction: Direction,
    started: Instant,
}

/// Controller for one logical slider
#[derive(Debug, Clone)]
pub struct SliderController {
    index: usize,

    // Routing
    board_address: u8,
    down_pin: u8,
    up_pin: u8,
    cc_number: u8,
    button_cc: Option<u8>,
    activity_cc: Option<u8>,

    // Ramp parameters
    speed_initial: f32,
    speed: f32,
    accel_rate: f32,

    down: TouchEdgeTracker,
    up: TouchEdgeTracker,

    /// Fractional position; the integer part is the MIDI value
    position: f32,
    /// Last value sent to (or received from) the host
    last_value: u8,
    press: Option<Press>,
    hold_duration: Duration,
    last_step: f32,
    button_active: bool,
    activity_on: bool,
}

impl SliderController {
    /// Build a controller from its configuration entry
    pub fn new(
        index: usize,
        config: &SliderConfig,
        debounce_interval: Duration,
    ) -> Result<Self, ConfigError> {
        config.validate(index)?;

        Ok(Self {
            index,
            board_address: config.board_address,
            down_pin: config.down_pin,
            up_pin: config.up_pin,
            cc_number: config.cc_number,
            button_cc: config.button_cc,
            activity_cc: config.activity_cc,
            speed_initial: config.speed_initial,
            speed: config.speed,
            accel_rate: config.accel_rate,
            down: TouchEdgeTracker::new(debounce_interval),
            up: TouchEdgeTracker::new(debounce_interval),
            position: config.initial_value as f32,
            last_value: config.initial_value,
            press: None,
            hold_duration: Duration::ZERO,
            last_step: 0.0,
            button_active: false,
            activity_on: false,
        })
    }

    /// Advance one tick with the raw electrode samples taken at `now`
    pub fn tick(&mut self, now: Instant, down_raw: bool, up_raw: bool) -> Vec<OutputEvent> {
        let mut events = Vec::new();

        let down_edge = self.down.sample(down_raw, now);
        let up_edge = self.up.sample(up_raw, now);
        if down_edge.is_some() || up_edge.is_some() {
            trace!(
                "Slider {} edges: down={:?} up={:?}",
                self.index, down_edge, up_edge
            );
        }

        let down = self.down.is_touched();
        let up = self.up.is_touched();
        let touched = down || up;

        if touched && !self.activity_on {
            self.activity_on = true;
            if let Some(cc) = self.activity_cc {
                events.push(OutputEvent::Activity { cc, active: true });
            }
        }

        if down && up {
            if !self.button_active {
                self.button_active = true;
                debug!("Touch -> Button (slider {}) ON", self.index);
                if let Some(cc) = self.button_cc {
                    events.push(OutputEvent::ButtonPressed { cc });
                }
            }
            self.end_press();
        } else {
            if self.button_active {
                self.button_active = false;
                debug!("Touch -> Button (slider {}) OFF", self.index);
                if let Some(cc) = self.button_cc {
                    events.push(OutputEvent::ButtonReleased { cc });
                }
            }

            match (down, up) {
                (true, false) => self.advance(Direction::Down, now, &mut events),
                (false, true) => self.advance(Direction::Up, now, &mut events),
                _ => self.end_press(),
            }
        }

        if !touched && self.activity_on {
            self.activity_on = false;
            if let Some(cc) = self.activity_cc {
                events.push(OutputEvent::Activity { cc, active: false });
            }
        }

        events
    }

    /// Apply one ramp step in `direction`
    fn advance(&mut self, direction: Direction, now: Instant, events: &mut Vec<OutputEvent>) {
        let step = match self.press {
            Some(press) if press.direction == direction => {
                self.hold_duration = now.saturating_duration_since(press.started);
                self.speed + self.accel_rate * self.hold_duration.as_secs_f32()
            }
            _ => {
                self.press = Some(Press { direction, started: now });
                self.hold_duration = Duration::ZERO;
                self.speed_initial
            }
        };
        self.last_step = step;

        let delta = match direction {
            Direction::Down => -step,
            Direction::Up => step,
        };
        self.position = (self.position + delta).clamp(0.0, MIDI_MAX as f32);

        let value = self.value();
        if value != self.last_value {
            self.last_value = value;
            trace!("Touch -> Slider (CC {}) = {}", self.cc_number, value);
            events.push(OutputEvent::ValueChanged { cc: self.cc_number, value });
        }
    }

    fn end_press(&mut self) {
        self.press = None;
        self.hold_duration = Duration::ZERO;
    }

    /// Overwrite the value from host feedback without emitting anything
    pub fn sync_value(&mut self, value: u8) {
        let value = value.min(MIDI_MAX);
        self.position = value as f32;
        self.last_value = value;
        debug!("MIDI In -> Slider (CC {}) = {}", self.cc_number, value);
    }

    /// Drop both electrodes back to untouched after a sensor re-calibration.
    ///
    /// Button and activity releases follow on the next tick.
    pub fn reset_sensors(&mut self) {
        self.down.reset();
        self.up.reset();
    }

    /// Current integer value (0-127)
    pub fn value(&self) -> u8 {
        self.position as u8
    }

    pub fn status(&self) -> SliderStatus {
        match (self.down.is_touched(), self.up.is_touched()) {
            (true, true) => SliderStatus::Both,
            (true, false) => SliderStatus::Down,
            (false, true) => SliderStatus::Up,
            (false, false) => SliderStatus::Idle,
        }
    }

    pub fn snapshot(&self, connected: bool) -> SliderSnapshot {
        SliderSnapshot {
            slider_index: self.index,
            cc_number: self.cc_number,
            button_cc: self.button_cc,
            value: self.value(),
            status: self.status(),
            connected,
        }
    }

    pub fn is_button_active(&self) -> bool {
        self.button_active
    }

    pub fn is_active(&self) -> bool {
        self.activity_on
    }

    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// Step size applied on the most recent slider-mode tick
    pub fn last_step(&self) -> f32 {
        self.last_step
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn board_address(&self) -> u8 {
        self.board_address
    }

    pub fn pins(&self) -> (u8, u8) {
        (self.down_pin, self.up_pin)
    }

    pub fn cc_number(&self) -> u8 {
        self.cc_number
    }
}

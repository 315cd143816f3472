//! Utensils touch bridge
//!
//! Turns pairs of capacitive electrodes into MIDI control change sliders
//! with debounce, hold acceleration, a both-press button per slider and a
//! collective "everyone both-presses" toggle.

pub mod calibration;
pub mod config;
pub mod control_loop;
pub mod display;
pub mod error;
pub mod event;
pub mod gesture;
pub mod midi;
pub mod sensors;
pub mod simulator;
pub mod slider;
pub mod touch;
pub mod transport;

pub use config::AppConfig;
pub use control_loop::{ControlLoop, TickOutput};
pub use event::OutputEvent;

//! Error types shared across the crate
//!
//! Configuration problems are fatal at startup. Transport failures are
//! logged and dropped by the caller; they never roll back control state.

use thiserror::Error;

/// Invalid configuration, detected once before the control loop starts
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one slider must be configured")]
    NoSliders,

    #[error("{field} value {value} is out of MIDI range (must be 0-127)")]
    OutOfMidiRange { field: String, value: u8 },

    #[error("CC {cc} is used more than once ({first} and {second})")]
    DuplicateCc { cc: u8, first: String, second: String },

    #[error("slider {slider}: pin {pin} is out of range (board has {max} electrodes)")]
    PinOutOfRange { slider: usize, pin: u8, max: u8 },

    #[error("board 0x{board:02X} pin {pin} is assigned more than once")]
    DuplicatePin { board: u8, pin: u8 },

    #[error("slider {slider}: {field} must be a finite, non-negative number (got {value})")]
    InvalidSpeed { slider: usize, field: &'static str, value: f32 },

    #[error("slider {slider}: speed_initial ({initial}) must not exceed speed ({speed})")]
    InitialStepTooLarge { slider: usize, initial: f32, speed: f32 },

    #[error("min_duration ({min_ms}ms) must not exceed max_duration ({max_ms}ms)")]
    MinExceedsMax { min_ms: u64, max_ms: u64 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("MIDI channel {0} is invalid (must be 1-16)")]
    InvalidChannel(u8),

    #[error("board 0x{0:02X} is used by a slider but not listed under sensors.boards")]
    UnknownBoard(u8),
}

/// MIDI delivery failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MIDI output is not connected")]
    NotConnected,

    #[error("failed to send MIDI message: {0}")]
    Send(String),
}

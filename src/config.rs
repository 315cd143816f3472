//! Configuration management
//!
//! Loads the YAML configuration once at startup and validates it. The
//! resulting [`AppConfig`] is immutable for the lifetime of the process and
//! is handed by reference to every component that needs it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::fs;

use crate::error::ConfigError;

/// Highest CC number / value representable in a 7-bit MIDI data byte
pub const MIDI_MAX: u8 = 127;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub all_both_press: AllBothPressConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub sensors: SensorConfig,
    pub sliders: Vec<SliderConfig>,
}

/// MIDI port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Output port name (case-insensitive substring match)
    pub output_port: String,
    /// Optional host feedback port; CCs received here resync slider values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    /// MIDI channel 1-16
    #[serde(default = "default_channel")]
    pub channel: u8,
}

/// Loop and debounce timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_interval_ms: u64,
    #[serde(default = "default_loop_delay_ms")]
    pub loop_delay_ms: u64,
}

/// Collective "every slider both-pressed" toggle
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AllBothPressConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_all_both_press_cc")]
    pub cc: u8,
    #[serde(default = "default_stable_time_ms")]
    pub stable_time_ms: u64,
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

/// Sensor re-calibration scheduling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalibrationConfig {
    /// Re-calibrate once, this long after the first inbound MIDI message
    #[serde(default = "default_true")]
    pub startup_enabled: bool,
    #[serde(default = "default_calibration_delay_ms")]
    pub startup_delay_ms: u64,
    /// Interval between sensor health checks (0 disables them)
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
}

/// Sensor board layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Board addresses; the index of an address is its slot on the MIDI note bus
    #[serde(default = "default_boards")]
    pub boards: Vec<u8>,
    #[serde(default = "default_pins_per_board")]
    pub pins_per_board: u8,
    /// Input port of a touch controller that reports pins as MIDI notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
}

/// One logical slider: two electrodes on the same board
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SliderConfig {
    pub board_address: u8,
    pub down_pin: u8,
    pub up_pin: u8,
    pub cc_number: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_cc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_cc: Option<u8>,
    #[serde(default = "default_speed")]
    pub speed_initial: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Step growth per second of continuous hold
    #[serde(default = "default_accel_rate")]
    pub accel_rate: f32,
    #[serde(default = "default_initial_value")]
    pub initial_value: u8,
}

impl TimingConfig {
    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }
}

impl AllBothPressConfig {
    pub fn stable_time(&self) -> Duration {
        Duration::from_millis(self.stable_time_ms)
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Check the timing relationships the toggle state machine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_duration_ms > self.max_duration_ms {
            return Err(ConfigError::MinExceedsMax {
                min_ms: self.min_duration_ms,
                max_ms: self.max_duration_ms,
            });
        }
        if self.max_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("all_both_press.max_duration_ms"));
        }
        if self.cc > MIDI_MAX {
            return Err(ConfigError::OutOfMidiRange {
                field: "all_both_press.cc".to_string(),
                value: self.cc,
            });
        }
        Ok(())
    }
}

impl CalibrationConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_ms > 0)
            .then(|| Duration::from_millis(self.health_check_interval_ms))
    }
}

impl SensorConfig {
    /// Slot index of a board address (MIDI channel on the note bus)
    pub fn slot_of(&self, board: u8) -> Option<usize> {
        self.boards.iter().position(|&b| b == board)
    }
}

impl SliderConfig {
    /// Validate the per-slider ranges that can be checked in isolation
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        for (field, value) in [
            ("cc_number", Some(self.cc_number)),
            ("button_cc", self.button_cc),
            ("activity_cc", self.activity_cc),
            ("initial_value", Some(self.initial_value)),
        ] {
            if let Some(value) = value {
                if value > MIDI_MAX {
                    return Err(ConfigError::OutOfMidiRange {
                        field: format!("sliders[{}].{}", index, field),
                        value,
                    });
                }
            }
        }

        for (field, value) in [
            ("speed_initial", self.speed_initial),
            ("speed", self.speed),
            ("accel_rate", self.accel_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidSpeed { slider: index, field, value });
            }
        }

        // A first step larger than the sustained step would make the ramp
        // decrease on the second tick.
        if self.speed_initial > self.speed {
            return Err(ConfigError::InitialStepTooLarge {
                slider: index,
                initial: self.speed_initial,
                speed: self.speed,
            });
        }

        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid configuration in {}", path))?;

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and routing consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sliders.is_empty() {
            return Err(ConfigError::NoSliders);
        }
        if !(1..=16).contains(&self.midi.channel) {
            return Err(ConfigError::InvalidChannel(self.midi.channel));
        }
        if self.timing.loop_delay_ms == 0 {
            return Err(ConfigError::ZeroDuration("timing.loop_delay_ms"));
        }
        if self.all_both_press.enabled {
            self.all_both_press.validate()?;
        }

        let mut pins_seen = HashSet::new();
        let mut cc_owners: HashMap<u8, String> = HashMap::new();

        let mut claim = |cc: u8, owner: String| -> Result<(), ConfigError> {
            match cc_owners.get(&cc) {
                Some(first) => Err(ConfigError::DuplicateCc {
                    cc,
                    first: first.clone(),
                    second: owner,
                }),
                None => {
                    cc_owners.insert(cc, owner);
                    Ok(())
                }
            }
        };

        for (idx, slider) in self.sliders.iter().enumerate() {
            slider.validate(idx)?;

            for pin in [slider.down_pin, slider.up_pin] {
                if pin >= self.sensors.pins_per_board {
                    return Err(ConfigError::PinOutOfRange {
                        slider: idx,
                        pin,
                        max: self.sensors.pins_per_board,
                    });
                }
            }

            if self.sensors.slot_of(slider.board_address).is_none() {
                return Err(ConfigError::UnknownBoard(slider.board_address));
            }
            for pin in [slider.down_pin, slider.up_pin] {
                if !pins_seen.insert((slider.board_address, pin)) {
                    return Err(ConfigError::DuplicatePin {
                        board: slider.board_address,
                        pin,
                    });
                }
            }

            claim(slider.cc_number, format!("sliders[{}].cc_number", idx))?;
            if let Some(cc) = slider.button_cc {
                claim(cc, format!("sliders[{}].button_cc", idx))?;
            }
            if let Some(cc) = slider.activity_cc {
                claim(cc, format!("sliders[{}].activity_cc", idx))?;
            }
        }

        if self.all_both_press.enabled {
            claim(self.all_both_press.cc, "all_both_press.cc".to_string())?;
        }

        Ok(())
    }

    /// Port patterns in use, as (inputs, outputs)
    pub fn port_patterns(&self) -> (Vec<&str>, Vec<&str>) {
        let inputs = [self.midi.input_port.as_deref(), self.sensors.input_port.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        (inputs, vec![self.midi.output_port.as_str()])
    }

    /// Board addresses actually referenced by sliders, in slider order
    pub fn used_boards(&self) -> Vec<u8> {
        let mut boards = Vec::new();
        for slider in &self.sliders {
            if !boards.contains(&slider.board_address) {
                boards.push(slider.board_address);
            }
        }
        boards
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_interval_ms: default_debounce_ms(),
            loop_delay_ms: default_loop_delay_ms(),
        }
    }
}

impl Default for AllBothPressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cc: default_all_both_press_cc(),
            stable_time_ms: default_stable_time_ms(),
            min_duration_ms: default_min_duration_ms(),
            max_duration_ms: default_max_duration_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            startup_enabled: true,
            startup_delay_ms: default_calibration_delay_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            boards: default_boards(),
            pins_per_board: default_pins_per_board(),
            input_port: None,
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_channel() -> u8 { 1 }
fn default_debounce_ms() -> u64 { 100 }
fn default_loop_delay_ms() -> u64 { 10 }
fn default_all_both_press_cc() -> u8 { 110 }
fn default_stable_time_ms() -> u64 { 3_000 }
fn default_min_duration_ms() -> u64 { 10_000 }
fn default_max_duration_ms() -> u64 { 30_000 }
fn default_cooldown_ms() -> u64 { 5_000 }
fn default_calibration_delay_ms() -> u64 { 20_000 }
fn default_health_check_interval_ms() -> u64 { 60_000 }
fn default_boards() -> Vec<u8> { vec![0x1A, 0x1B, 0x5A, 0x5B] }
fn default_pins_per_board() -> u8 { 12 }
fn default_speed() -> f32 { 1.0 }
fn default_accel_rate() -> f32 { 10.0 }
fn default_initial_value() -> u8 { 64 }

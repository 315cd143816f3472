//! Sensor boards behind a MIDI touch controller
//!
//! A microcontroller scanning the boards forwards electrode changes as notes:
//! the channel is the board's slot in `sensors.boards`, the note number is the
//! pin, Note On means touched. A board counts as absent until it has sent
//! something.

use anyhow::{Context, Result};
use midir::{Ignore, MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::SensorBus;
use crate::midi::{format_hex, MidiMessage};
use crate::transport::find_input_port;

/// Touch masks decoded from incoming notes
#[derive(Debug, Default)]
struct NoteState {
    /// Board address per MIDI channel
    boards: Vec<u8>,
    masks: HashMap<u8, u16>,
}

impl NoteState {
    fn apply(&mut self, message: &MidiMessage) {
        let (channel, note, touched) = match *message {
            MidiMessage::NoteOn { channel, note, .. } => (channel, note, true),
            MidiMessage::NoteOff { channel, note, .. } => (channel, note, false),
            MidiMessage::ControlChange { .. } => return,
        };

        let Some(&address) = self.boards.get(channel as usize) else {
            debug!("Touch note on unmapped channel {}", channel + 1);
            return;
        };
        if note >= 16 {
            return;
        }

        let mask = self.masks.entry(address).or_insert(0);
        if touched {
            *mask |= 1 << note;
        } else {
            *mask &= !(1 << note);
        }
    }
}

pub struct MidiNoteBus {
    state: Arc<Mutex<NoteState>>,
    /// Port pattern; `None` for a detached bus
    port_pattern: Option<String>,
    port_name: String,
    /// Looks the port up again during health checks
    port_lookup: fn(&str) -> bool,
    port_lost: bool,
    _connection: Option<MidiInputConnection<()>>,
}

impl MidiNoteBus {
    /// Open the touch controller's input port
    pub fn connect(port_pattern: &str, boards: &[u8]) -> Result<Self> {
        let mut bus = Self::detached(boards);
        bus.port_pattern = Some(port_pattern.to_string());
        bus.open()?;
        Ok(bus)
    }

    /// A bus with no port attached; fed through [`MidiNoteBus::handle`]
    pub fn detached(boards: &[u8]) -> Self {
        Self {
            state: Arc::new(Mutex::new(NoteState {
                boards: boards.to_vec(),
                masks: HashMap::new(),
            })),
            port_pattern: None,
            port_name: String::from("(detached)"),
            port_lookup: port_exists,
            port_lost: false,
            _connection: None,
        }
    }

    fn open(&mut self) -> Result<()> {
        let Some(pattern) = self.port_pattern.as_deref() else {
            return Ok(());
        };

        let mut midi_in =
            MidiInput::new("Utensils-Touch-Sensors").context("Failed to create MIDI input")?;
        midi_in.ignore(Ignore::All);

        let (port, port_name) = find_input_port(&midi_in, pattern)
            .ok_or_else(|| anyhow::anyhow!("Sensor input port '{}' not found", pattern))?;

        info!("Connecting to sensor input port: {}", port_name);

        let state = self.state.clone();
        let connection = midi_in
            .connect(
                &port,
                "Utensils-Touch-Sensors",
                move |_stamp, data, _| match MidiMessage::parse(data) {
                    Some(message) => state.lock().apply(&message),
                    None => debug!("Ignoring sensor MIDI: {}", format_hex(data)),
                },
                (),
            )
            .map_err(|e| anyhow::Error::msg(e.to_string()))
            .context("Failed to connect to sensor input port")?;

        self.port_name = port_name;
        self._connection = Some(connection);
        Ok(())
    }

    /// Apply one raw MIDI message
    pub fn handle(&self, data: &[u8]) {
        if let Some(message) = MidiMessage::parse(data) {
            self.state.lock().apply(&message);
        }
    }

    /// Check that the port still exists.
    ///
    /// A vanished port drops the connection and forgets every mask, so all
    /// boards read as absent until the controller is back and sends again.
    fn check_port(&mut self) -> bool {
        let Some(pattern) = self.port_pattern.as_deref() else {
            return true;
        };

        if !(self.port_lookup)(pattern) {
            if !self.port_lost {
                warn!("Sensor input port '{}' disappeared", self.port_name);
                self.port_lost = true;
            }
            self._connection = None;
            self.state.lock().masks.clear();
            return false;
        }

        if self.port_lost {
            if let Err(e) = self.open() {
                warn!("Sensor input port reconnect failed: {:#}", e);
                return false;
            }
            info!("Sensor input port '{}' back", self.port_name);
            self.port_lost = false;
        }
        true
    }
}

/// True when an input port matching `pattern` is currently listed
fn port_exists(pattern: &str) -> bool {
    match MidiInput::new("Utensils-Touch-Lookup") {
        Ok(midi_in) => find_input_port(&midi_in, pattern).is_some(),
        Err(e) => {
            debug!("Cannot list MIDI inputs: {}", e);
            false
        }
    }
}

impl SensorBus for MidiNoteBus {
    fn read_board(&mut self, address: u8) -> Option<u16> {
        self.state.lock().masks.get(&address).copied()
    }

    fn recalibrate(&mut self, address: u8) {
        if let Some(mask) = self.state.lock().masks.get_mut(&address) {
            *mask = 0;
            debug!("Cleared touch state of board 0x{:02X}", address);
        }
    }

    fn health_check(&mut self, address: u8) -> bool {
        self.check_port() && self.read_board(address).is_some()
    }

    fn describe(&self) -> String {
        format!("MIDI note bus on '{}'", self.port_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARDS: [u8; 4] = [0x1A, 0x1B, 0x5A, 0x5B];

    #[test]
    fn test_board_absent_until_first_message() {
        let mut bus = MidiNoteBus::detached(&BOARDS);
        assert_eq!(bus.read_board(0x1A), None);

        // Note Off on channel 1 still marks board 0x1A present
        bus.handle(&[0x80, 5, 0]);
        assert_eq!(bus.read_board(0x1A), Some(0));
        assert_eq!(bus.read_board(0x1B), None);
    }

    #[test]
    fn test_notes_map_to_pins() {
        let mut bus = MidiNoteBus::detached(&BOARDS);

        bus.handle(&[0x92, 3, 100]); // channel 3 -> 0x5A, pin 3
        bus.handle(&[0x92, 11, 100]);
        assert_eq!(bus.read_board(0x5A), Some((1 << 3) | (1 << 11)));

        bus.handle(&[0x92, 3, 0]); // velocity 0 release
        assert_eq!(bus.read_board(0x5A), Some(1 << 11));
    }

    #[test]
    fn test_unmapped_channel_and_cc_ignored() {
        let mut bus = MidiNoteBus::detached(&BOARDS);
        bus.handle(&[0x9F, 1, 100]);
        bus.handle(&[0xB0, 1, 100]);

        for address in BOARDS {
            assert_eq!(bus.read_board(address), None);
        }
    }

    #[test]
    fn test_recalibrate_clears_mask() {
        let mut bus = MidiNoteBus::detached(&BOARDS);
        bus.handle(&[0x91, 2, 127]);
        bus.recalibrate(0x1B);
        assert_eq!(bus.read_board(0x1B), Some(0));
        assert!(bus.health_check(0x1B));
    }

    #[test]
    fn test_port_loss_forgets_latched_touches() {
        let mut bus = MidiNoteBus::detached(&BOARDS);
        bus.port_pattern = Some("Touch Controller".to_string());
        bus.port_lookup = |_| true;

        bus.handle(&[0x90, 1, 100]);
        assert_eq!(bus.read_board(0x1A), Some(0b10));
        assert!(bus.health_check(0x1A));

        // Controller unplugged while pin 1 was held
        bus.port_lookup = |_| false;
        assert!(!bus.health_check(0x1A));
        for address in BOARDS {
            assert_eq!(bus.read_board(address), None);
        }
    }

    #[test]
    fn test_detached_bus_skips_port_lookup() {
        let mut bus = MidiNoteBus::detached(&BOARDS);
        bus.port_lookup = |_| false;
        bus.handle(&[0x90, 1, 100]);
        assert!(bus.health_check(0x1A));
        assert_eq!(bus.read_board(0x1A), Some(0b10));
    }
}

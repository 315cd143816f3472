//! MIDI message types
//!
//! Only the channel-voice messages this bridge speaks are modelled: Control
//! Change going out, Control Change and Note On/Off coming in.

use std::fmt;

/// A channel-less control change, as emitted by the control core.
///
/// The transport stamps the configured channel onto it when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ControlChange {
    pub cc: u8,
    pub value: u8,
}

impl ControlChange {
    pub fn new(cc: u8, value: u8) -> Self {
        Self {
            cc: cc & 0x7F,
            value: value & 0x7F,
        }
    }

    /// Attach a 0-based channel to get an encodable message
    pub fn on_channel(self, channel: u8) -> MidiMessage {
        MidiMessage::ControlChange {
            channel,
            cc: self.cc,
            value: self.value,
        }
    }
}

impl fmt::Display for ControlChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CC {} = {}", self.cc, self.value)
    }
}

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Returns `None` for running status, system messages and channel
    /// messages this bridge does not handle.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) || rest.len() < 2 {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = rest[0] & 0x7F;
        let data2 = rest[1] & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff { channel, note: data1, velocity: data2 }),
            // Note On with velocity 0 is a Note Off
            0x90 if data2 == 0 => Some(MidiMessage::NoteOff { channel, note: data1, velocity: 0 }),
            0x90 => Some(MidiMessage::NoteOn { channel, note: data1, velocity: data2 }),
            0xB0 => Some(MidiMessage::ControlChange { channel, cc: data1, value: data2 }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

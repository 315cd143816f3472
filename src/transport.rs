//! MIDI ports
//!
//! Outbound control changes go through a [`CcTransport`]; delivery is
//! fire-and-forget. An optional host feedback input forwards every parsed
//! message into a tokio channel for the main loop.

use anyhow::{Context, Result};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::midi::{format_hex, ControlChange, MidiMessage};

/// Destination for outbound control changes
pub trait CcTransport {
    fn send(&mut self, cc: ControlChange) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool {
        true
    }
}

/// midir output connection stamping a fixed channel onto every message
pub struct MidirTransport {
    conn: MidiOutputConnection,
    port_name: String,
    /// 0-based
    channel: u8,
}

impl MidirTransport {
    /// Open the first output port whose name contains `pattern`
    /// (case-insensitive). `channel` is 1-16.
    pub fn connect(pattern: &str, channel: u8) -> Result<Self> {
        let midi_out =
            MidiOutput::new("Utensils-Touch-Output").context("Failed to create MIDI output")?;

        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (port, port_name) = find_output_port(&midi_out, pattern)
            .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", port_name);

        let conn = midi_out
            .connect(&port, "Utensils-Touch")
            .map_err(|e| anyhow::Error::msg(e.to_string()))
            .context("Failed to connect to output port")?;

        Ok(Self {
            conn,
            port_name,
            channel: channel.saturating_sub(1) & 0x0F,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl CcTransport for MidirTransport {
    fn send(&mut self, cc: ControlChange) -> Result<(), TransportError> {
        let data = cc.on_channel(self.channel).encode();
        self.conn
            .send(&data)
            .map_err(|e| TransportError::Send(e.to_string()))?;
        trace!("Sent: {} | {}", format_hex(&data), cc);
        Ok(())
    }
}

/// Stand-in used when no output port could be opened
#[derive(Debug, Default)]
pub struct NullTransport;

impl CcTransport for NullTransport {
    fn send(&mut self, _cc: ControlChange) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Open the host feedback port; every parsed message is pushed into `tx`.
///
/// The connection must be kept alive for as long as feedback is wanted.
pub fn connect_host_feedback(
    pattern: &str,
    tx: mpsc::Sender<MidiMessage>,
) -> Result<MidiInputConnection<()>> {
    let mut midi_in =
        MidiInput::new("Utensils-Touch-Feedback").context("Failed to create MIDI input")?;
    midi_in.ignore(Ignore::All);

    let (port, port_name) = find_input_port(&midi_in, pattern)
        .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", pattern))?;

    info!("Connecting to host feedback port: {}", port_name);

    midi_in
        .connect(
            &port,
            "Utensils-Touch",
            move |_stamp, data, _| match MidiMessage::parse(data) {
                Some(message) => {
                    // Never block the midir thread
                    if let Err(e) = tx.try_send(message) {
                        warn!("Dropping host MIDI message: {}", e);
                    }
                }
                None => debug!("Ignoring host MIDI: {}", format_hex(data)),
            },
            (),
        )
        .map_err(|e| anyhow::Error::msg(e.to_string()))
            .context("Failed to connect to host feedback port")
}

/// Find an input port by case-insensitive substring
pub(crate) fn find_input_port(
    midi_in: &MidiInput,
    pattern: &str,
) -> Option<(MidiInputPort, String)> {
    midi_in.ports().into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        port_matches(&name, pattern).then_some((port, name))
    })
}

/// Find an output port by case-insensitive substring
pub(crate) fn find_output_port(
    midi_out: &MidiOutput,
    pattern: &str,
) -> Option<(MidiOutputPort, String)> {
    midi_out.ports().into_iter().find_map(|port| {
        let name = midi_out.port_name(&port).ok()?;
        port_matches(&name, pattern).then_some((port, name))
    })
}

/// Names of all MIDI input and output ports
pub fn discover_ports() -> Result<(Vec<String>, Vec<String>)> {
    let midi_in = MidiInput::new("Utensils-Touch-Discovery")?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect();

    let midi_out = MidiOutput::new("Utensils-Touch-Discovery")?;
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect();

    Ok((inputs, outputs))
}

/// Case-insensitive substring match of a port name
pub fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

fn is_virtual(name: &str) -> bool {
    name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC")
}

/// Print available MIDI ports, highlighting the configured ones
pub fn list_ports_formatted(input_patterns: &[&str], output_patterns: &[&str]) -> Result<()> {
    use colored::*;

    let (inputs, outputs) = discover_ports()?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for (title, ports, patterns) in [
        ("Input Ports:", &inputs, input_patterns),
        ("Output Ports:", &outputs, output_patterns),
    ] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
            continue;
        }
        for name in ports {
            let marker = if is_virtual(name) {
                "[VIRTUAL]".yellow()
            } else {
                "[PHYSICAL]".green()
            };
            if patterns.iter().any(|p| port_matches(name, p)) {
                println!("  {} {} {}", marker, name.bright_white(), "(configured)".cyan());
            } else {
                println!("  {} {}", marker, name);
            }
        }
    }

    println!();
    Ok(())
}

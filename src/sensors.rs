//! Capacitive sensor boards
//!
//! Each board reports a 12-bit touch mask, one bit per electrode pin. The
//! control loop never talks to a bus directly: once per tick the binary reads
//! every board into an [`InputSnapshot`] and hands that to the loop.

pub mod midi_bus;
pub mod simulated;

use std::collections::HashMap;
use tracing::trace;

pub use midi_bus::MidiNoteBus;
pub use simulated::SimulatedBus;

/// Source of raw touch masks
pub trait SensorBus {
    /// Touch mask of a board, or `None` when the board does not respond
    fn read_board(&mut self, address: u8) -> Option<u16>;

    /// Reset the electrode baseline of a board
    fn recalibrate(&mut self, address: u8);

    /// Check a board; returns true when it responds
    fn health_check(&mut self, address: u8) -> bool {
        self.read_board(address).is_some()
    }

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Raw samples of every board, taken once per tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    /// Boards that responded; missing entries are absent boards
    masks: HashMap<u8, u16>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the given boards from a bus
    pub fn read(bus: &mut dyn SensorBus, boards: &[u8]) -> Self {
        let mut snapshot = Self::new();
        for &address in boards {
            if let Some(mask) = bus.read_board(address) {
                trace!("Board 0x{:02X} mask {:012b}", address, mask);
                snapshot.masks.insert(address, mask);
            }
        }
        snapshot
    }

    /// Record a board's mask (builder style)
    pub fn with_board(mut self, address: u8, mask: u16) -> Self {
        self.masks.insert(address, mask);
        self
    }

    /// Record a board's mask
    pub fn set_board(&mut self, address: u8, mask: u16) {
        self.masks.insert(address, mask);
    }

    /// Touch mask of a board, `None` if it is absent
    pub fn board(&self, address: u8) -> Option<u16> {
        self.masks.get(&address).copied()
    }

    pub fn is_present(&self, address: u8) -> bool {
        self.masks.contains_key(&address)
    }
}

/// Test a pin bit in a touch mask
pub fn pin_touched(mask: u16, pin: u8) -> bool {
    pin < 16 && mask & (1 << pin) != 0
}

//! In-memory sensor bus
//!
//! Cloning a [`SimulatedBus`] shares the same board state, so the REPL can
//! poke pins from its own thread while the control loop reads them.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::SensorBus;

#[derive(Debug, Default, Clone)]
struct BoardState {
    present: bool,
    mask: u16,
    recalibrations: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    boards: Arc<Mutex<BTreeMap<u8, BoardState>>>,
}

impl SimulatedBus {
    /// Create a bus with the given boards present and untouched
    pub fn new(addresses: &[u8]) -> Self {
        let boards = addresses
            .iter()
            .map(|&address| {
                (
                    address,
                    BoardState {
                        present: true,
                        ..Default::default()
                    },
                )
            })
            .collect();

        Self {
            boards: Arc::new(Mutex::new(boards)),
        }
    }

    /// Touch or release one electrode
    pub fn set_pin(&self, address: u8, pin: u8, touched: bool) {
        if pin >= 16 {
            return;
        }
        let mut boards = self.boards.lock();
        let board = boards.entry(address).or_default();
        if touched {
            board.mask |= 1 << pin;
        } else {
            board.mask &= !(1 << pin);
        }
    }

    /// Connect or disconnect a board
    pub fn set_present(&self, address: u8, present: bool) {
        self.boards.lock().entry(address).or_default().present = present;
    }

    /// Release every electrode on every board
    pub fn release_all(&self) {
        for board in self.boards.lock().values_mut() {
            board.mask = 0;
        }
    }

    /// Number of re-calibrations a board has received
    pub fn recalibrations(&self, address: u8) -> u32 {
        self.boards
            .lock()
            .get(&address)
            .map(|b| b.recalibrations)
            .unwrap_or(0)
    }
}

impl SensorBus for SimulatedBus {
    fn read_board(&mut self, address: u8) -> Option<u16> {
        self.boards
            .lock()
            .get(&address)
            .filter(|b| b.present)
            .map(|b| b.mask)
    }

    fn recalibrate(&mut self, address: u8) {
        if let Some(board) = self.boards.lock().get_mut(&address) {
            board.recalibrations += 1;
            board.mask = 0;
            debug!("Simulated board 0x{:02X} re-calibrated", address);
        }
    }

    fn describe(&self) -> String {
        format!("simulated bus ({} boards)", self.boards.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let bus = SimulatedBus::new(&[0x1A]);
        let mut reader = bus.clone();

        bus.set_pin(0x1A, 3, true);
        assert_eq!(reader.read_board(0x1A), Some(0b1000));

        bus.set_pin(0x1A, 3, false);
        assert_eq!(reader.read_board(0x1A), Some(0));
    }

    #[test]
    fn test_absent_board() {
        let mut bus = SimulatedBus::new(&[0x1A]);
        assert_eq!(bus.read_board(0x1B), None);

        bus.set_present(0x1A, false);
        assert_eq!(bus.read_board(0x1A), None);
        assert!(!bus.health_check(0x1A));

        bus.set_present(0x1A, true);
        assert!(bus.health_check(0x1A));
    }

    #[test]
    fn test_recalibrate_counts_and_clears() {
        let mut bus = SimulatedBus::new(&[0x1A]);
        bus.set_pin(0x1A, 0, true);
        bus.recalibrate(0x1A);

        assert_eq!(bus.recalibrations(0x1A), 1);
        assert_eq!(bus.read_board(0x1A), Some(0));
        assert_eq!(bus.recalibrations(0x5B), 0);
    }

    #[test]
    fn test_release_all() {
        let mut bus = SimulatedBus::new(&[0x1A, 0x1B]);
        bus.set_pin(0x1A, 0, true);
        bus.set_pin(0x1B, 11, true);
        bus.release_all();

        assert_eq!(bus.read_board(0x1A), Some(0));
        assert_eq!(bus.read_board(0x1B), Some(0));
    }
}

//! Control loop
//!
//! Ticks every slider and the collective gesture aggregator once per cycle.
//! A tick runs in three phases: sample (an [`InputSnapshot`] read once from
//! the sensor bus), transition (pure state updates returning events), and
//! effects (delivery to the MIDI transport and the display).

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::display::DisplaySink;
use crate::error::ConfigError;
use crate::event::OutputEvent;
use crate::gesture::{CollectiveGestureAggregator, GestureStatus};
use crate::sensors::{pin_touched, InputSnapshot, SensorBus};
use crate::slider::{SliderController, SliderSnapshot};
use crate::transport::CcTransport;


/// What one tick produced
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub events: Vec<OutputEvent>,
    pub snapshots: Vec<SliderSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Unknown,
    Present,
    Missing,
}

/// Connection state of one sensor board
#[derive(Debug, Clone, Serialize)]
pub struct BoardStatus {
    pub address: u8,
    pub connected: bool,
    pub sliders: usize,
}

/// Summary for the startup report and the simulator's `status` command
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub boards: Vec<BoardStatus>,
    pub sliders_total: usize,
    pub sliders_participating: usize,
    pub gesture: GestureStatus,
}

impl SystemStatus {
    /// True when every board used by a slider responded
    pub fn is_healthy(&self) -> bool {
        self.boards.iter().all(|b| b.connected)
    }
}

pub struct ControlLoop {
    sliders: Vec<SliderController>,
    aggregator: CollectiveGestureAggregator,
    /// Boards referenced by at least one slider
    boards: BTreeMap<u8, Presence>,
}

impl ControlLoop {
    /// Build every slider and the aggregator from a validated configuration
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let debounce = config.timing.debounce_interval();

        let sliders = config
            .sliders
            .iter()
            .enumerate()
            .map(|(idx, slider)| SliderController::new(idx, slider, debounce))
            .collect::<Result<Vec<_>, _>>()?;

        let aggregator = CollectiveGestureAggregator::new(&config.all_both_press)?;

        let boards = config
            .used_boards()
            .into_iter()
            .map(|address| (address, Presence::Unknown))
            .collect();

        info!(
            "Control loop ready: {} sliders, debounce {:?}",
            sliders.len(),
            debounce
        );

        Ok(Self {
            sliders,
            aggregator,
            boards,
        })
    }

    /// Board addresses to sample each tick
    pub fn boards(&self) -> Vec<u8> {
        self.boards.keys().copied().collect()
    }

    /// Advance every component by one tick
    pub fn tick(&mut self, now: Instant, input: &InputSnapshot) -> TickOutput {
        self.update_presence(input);

        let mut events = Vec::new();
        for slider in &mut self.sliders {
            let (down_pin, up_pin) = slider.pins();
            // Absent board: both electrodes read untouched
            let (down, up) = match input.board(slider.board_address()) {
                Some(mask) => (pin_touched(mask, down_pin), pin_touched(mask, up_pin)),
                None => (false, false),
            };
            events.extend(slider.tick(now, down, up));
        }

        let collective = self.collective_both(input);
        events.extend(self.aggregator.tick(now, collective));

        TickOutput {
            events,
            snapshots: self.snapshots(input),
        }
    }

    /// Sample, tick, then deliver the result
    pub fn step(
        &mut self,
        now: Instant,
        bus: &mut dyn SensorBus,
        transport: &mut dyn CcTransport,
        display: &mut dyn DisplaySink,
    ) -> TickOutput {
        let input = InputSnapshot::read(bus, &self.boards());
        let output = self.tick(now, &input);

        deliver(transport, &output.events);
        display.render(&output.snapshots);

        output
    }

    /// True when every slider on a present board is in both-press.
    /// False when no board is present.
    fn collective_both(&self, input: &InputSnapshot) -> bool {
        let mut participating = self
            .sliders
            .iter()
            .filter(|s| input.is_present(s.board_address()))
            .peekable();

        participating.peek().is_some() && participating.all(|s| s.is_button_active())
    }

    fn snapshots(&self, input: &InputSnapshot) -> Vec<SliderSnapshot> {
        self.sliders
            .iter()
            .map(|s| s.snapshot(input.is_present(s.board_address())))
            .collect()
    }

    fn update_presence(&mut self, input: &InputSnapshot) {
        for (&address, presence) in self.boards.iter_mut() {
            let next = if input.is_present(address) {
                Presence::Present
            } else {
                Presence::Missing
            };
            if next == *presence {
                continue;
            }

            match (*presence, next) {
                (_, Presence::Missing) => {
                    warn!("Sensor board 0x{:02X} not responding - its sliders stay idle", address)
                }
                (Presence::Missing, Presence::Present) => {
                    info!("Sensor board 0x{:02X} reconnected", address)
                }
                _ => debug!("Sensor board 0x{:02X} detected", address),
            }
            *presence = next;
        }
    }

    /// Apply a control change received from the host.
    ///
    /// Returns true when a slider owns `cc`.
    pub fn sync_from_host(&mut self, cc: u8, value: u8) -> bool {
        match self.sliders.iter_mut().find(|s| s.cc_number() == cc) {
            Some(slider) => {
                slider.sync_value(value);
                true
            }
            None => false,
        }
    }

    /// Reset every electrode tracker and re-calibrate all present boards
    pub fn recalibrate(&mut self, bus: &mut dyn SensorBus) {
        info!("Re-calibrating touch sensors");

        for slider in &mut self.sliders {
            slider.reset_sensors();
        }
        for (&address, presence) in &self.boards {
            if *presence == Presence::Present {
                bus.recalibrate(address);
            }
        }
    }

    /// Check every board; returns true when all respond
    pub fn health_check(&mut self, bus: &mut dyn SensorBus) -> bool {
        let mut healthy = true;
        for &address in self.boards.keys() {
            if bus.health_check(address) {
                debug!("Sensor board 0x{:02X} OK", address);
            } else {
                warn!("Sensor board 0x{:02X} failed health check", address);
                healthy = false;
            }
        }
        healthy
    }

    pub fn system_status(&self) -> SystemStatus {
        let boards: Vec<BoardStatus> = self
            .boards
            .iter()
            .map(|(&address, &presence)| BoardStatus {
                address,
                connected: presence == Presence::Present,
                sliders: self
                    .sliders
                    .iter()
                    .filter(|s| s.board_address() == address)
                    .count(),
            })
            .collect();

        let sliders_participating = boards
            .iter()
            .filter(|b| b.connected)
            .map(|b| b.sliders)
            .sum();

        SystemStatus {
            boards,
            sliders_total: self.sliders.len(),
            sliders_participating,
            gesture: self.aggregator.status(),
        }
    }

    pub fn sliders(&self) -> &[SliderController] {
        &self.sliders
    }

    pub fn aggregator(&self) -> &CollectiveGestureAggregator {
        &self.aggregator
    }
}

/// Send events in order; failures are logged and the event is dropped
pub fn deliver(transport: &mut dyn CcTransport, events: &[OutputEvent]) {
    for event in events {
        match transport.send(event.control_change()) {
            Ok(()) => debug!("MIDI Out: {}", event),
            Err(e) => warn!("Dropped {}: {}", event, e),
        }
    }
}

/// Log the startup status report
pub fn log_system_status(status: &SystemStatus) {
    info!("=== SYSTEM STATUS ===");
    for board in &status.boards {
        info!(
            "  Board 0x{:02X}: {} ({} sliders)",
            board.address,
            if board.connected { "CONNECTED" } else { "MISSING" },
            board.sliders
        );
    }
    info!(
        "  Sliders participating: {}/{}",
        status.sliders_participating, status.sliders_total
    );
    if status.gesture.enabled {
        info!(
            "  All both-press (CC {}): {}",
            status.gesture.cc, status.gesture.state
        );
    } else {
        info!("  All both-press: disabled");
    }
    if status.is_healthy() {
        info!("  System status: HEALTHY");
    } else {
        warn!("  System status: DEGRADED - some sensor boards are missing");
    }
}

//! Events emitted by the control core
//!
//! Components return these instead of talking to the MIDI transport; the
//! control loop delivers them after the state transition phase of a tick.

use serde::Serialize;
use std::fmt;

use crate::midi::ControlChange;

/// Value sent for "on" states (button pressed, activity, toggle)
pub const CC_ON: u8 = 127;
/// Value sent for "off" states
pub const CC_OFF: u8 = 0;

/// Something the core wants delivered as a control change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputEvent {
    /// Slider value moved to a new integer position
    ValueChanged { cc: u8, value: u8 },
    /// Both electrodes of a slider became touched
    ButtonPressed { cc: u8 },
    /// A slider left the both-touched state
    ButtonReleased { cc: u8 },
    /// A slider went from idle to touched (`true`) or back (`false`)
    Activity { cc: u8, active: bool },
    /// Collective gesture activated
    ToggleOn { cc: u8 },
    /// Collective gesture deactivated
    ToggleOff { cc: u8 },
}

impl OutputEvent {
    /// The wire-level control change for this event
    pub fn control_change(&self) -> ControlChange {
        match *self {
            OutputEvent::ValueChanged { cc, value } => ControlChange::new(cc, value),
            OutputEvent::ButtonPressed { cc } | OutputEvent::ToggleOn { cc } => {
                ControlChange::new(cc, CC_ON)
            }
            OutputEvent::ButtonReleased { cc } | OutputEvent::ToggleOff { cc } => {
                ControlChange::new(cc, CC_OFF)
            }
            OutputEvent::Activity { cc, active } => {
                ControlChange::new(cc, if active { CC_ON } else { CC_OFF })
            }
        }
    }
}

impl fmt::Display for OutputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OutputEvent::ValueChanged { cc, value } => write!(f, "Slider (CC {}) = {}", cc, value),
            OutputEvent::ButtonPressed { cc } => write!(f, "Button (CC {}) ON", cc),
            OutputEvent::ButtonReleased { cc } => write!(f, "Button (CC {}) OFF", cc),
            OutputEvent::Activity { cc, active } => {
                write!(f, "Activity (CC {}) {}", cc, if active { "ON" } else { "OFF" })
            }
            OutputEvent::ToggleOn { cc } => write!(f, "All Both-Press Toggle (CC {}) ON", cc),
            OutputEvent::ToggleOff { cc } => write!(f, "All Both-Press Toggle (CC {}) OFF", cc),
        }
    }
}

//! Interactive simulator
//!
//! Drives a [`SimulatedBus`] from a rustyline prompt so the whole control
//! path can be exercised without sensor hardware. The prompt runs on its own
//! thread; requests that need the control loop go through a channel.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::str::FromStr;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::sensors::SimulatedBus;

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Down(usize),
    Up(usize),
    Both(usize),
    /// `None` releases every slider
    Release(Option<usize>),
    AllBoth,
    Status,
    Help,
    Quit,
}

impl FromStr for SimCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().ok_or_else(|| "empty command".to_string())?;
        let arg = parts.next();

        let slider = |arg: Option<&str>| -> Result<usize, String> {
            let arg = arg.ok_or_else(|| format!("'{}' needs a slider number", cmd))?;
            arg.parse()
                .map_err(|_| format!("'{}' is not a slider number", arg))
        };

        match cmd.to_lowercase().as_str() {
            "down" | "d" => Ok(SimCommand::Down(slider(arg)?)),
            "up" | "u" => Ok(SimCommand::Up(slider(arg)?)),
            "both" | "b" => Ok(SimCommand::Both(slider(arg)?)),
            "release" | "r" => match arg {
                None | Some("all") => Ok(SimCommand::Release(None)),
                Some(_) => Ok(SimCommand::Release(Some(slider(arg)?))),
            },
            "all-both" | "ab" => Ok(SimCommand::AllBoth),
            "status" | "s" => Ok(SimCommand::Status),
            "help" | "h" | "?" => Ok(SimCommand::Help),
            "quit" | "exit" | "q" => Ok(SimCommand::Quit),
            other => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }
}

/// Requests the prompt sends to the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRequest {
    Status,
    Quit,
}

#[derive(Debug, Clone, Copy)]
struct SliderPins {
    board: u8,
    down: u8,
    up: u8,
}

/// Maps simulator commands onto electrode states
pub struct Simulator {
    bus: SimulatedBus,
    sliders: Vec<SliderPins>,
}

impl Simulator {
    pub fn new(bus: SimulatedBus, config: &AppConfig) -> Self {
        let sliders = config
            .sliders
            .iter()
            .map(|s| SliderPins {
                board: s.board_address,
                down: s.down_pin,
                up: s.up_pin,
            })
            .collect();
        Self { bus, sliders }
    }

    /// Apply a pin command; other commands are ignored
    pub fn apply(&self, cmd: &SimCommand) -> Result<(), String> {
        match *cmd {
            SimCommand::Down(idx) => self.set(idx, true, false),
            SimCommand::Up(idx) => self.set(idx, false, true),
            SimCommand::Both(idx) => self.set(idx, true, true),
            SimCommand::Release(Some(idx)) => self.set(idx, false, false),
            SimCommand::Release(None) => {
                self.bus.release_all();
                Ok(())
            }
            SimCommand::AllBoth => {
                for idx in 0..self.sliders.len() {
                    self.set(idx, true, true)?;
                }
                Ok(())
            }
            SimCommand::Status | SimCommand::Help | SimCommand::Quit => Ok(()),
        }
    }

    fn set(&self, idx: usize, down: bool, up: bool) -> Result<(), String> {
        let pins = self.sliders.get(idx).ok_or_else(|| {
            format!("slider {} does not exist (0-{})", idx, self.sliders.len().saturating_sub(1))
        })?;
        self.bus.set_pin(pins.board, pins.down, down);
        self.bus.set_pin(pins.board, pins.up, up);
        Ok(())
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}     touch the down electrode of slider N", "down N".cyan());
    println!("  {}       touch the up electrode of slider N", "up N".cyan());
    println!("  {}     touch both electrodes of slider N", "both N".cyan());
    println!("  {} release slider N, or every slider", "release N|all".cyan());
    println!("  {}     both-press every slider", "all-both".cyan());
    println!("  {}       print the system status", "status".cyan());
    println!("  {}         leave the simulator", "quit".cyan());
}

/// Run the prompt until `quit`, Ctrl+C or Ctrl+D. Blocking.
pub fn run_repl(simulator: Simulator, tx: mpsc::Sender<LoopRequest>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("{}", "=== Touch Simulator ===".bold().cyan());
    print_help();

    loop {
        let line = match rl.readline("touch> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                let _ = tx.blocking_send(LoopRequest::Quit);
                return Err(e.into());
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let cmd = match line.parse::<SimCommand>() {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{}", e.red());
                continue;
            }
        };

        match cmd {
            SimCommand::Help => print_help(),
            SimCommand::Quit => break,
            SimCommand::Status => {
                if tx.blocking_send(LoopRequest::Status).is_err() {
                    break;
                }
            }
            _ => {
                if let Err(e) = simulator.apply(&cmd) {
                    println!("{}", e.red());
                }
            }
        }
    }

    let _ = tx.blocking_send(LoopRequest::Quit);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorBus;

    const CONFIG: &str = r#"
midi:
  output_port: "loopMIDI"
sliders:
  - { board_address: 26, down_pin: 0, up_pin: 1, cc_number: 1 }
  - { board_address: 27, down_pin: 4, up_pin: 5, cc_number: 2 }
"#;

    #[test]
    fn test_parse_commands() {
        assert_eq!("down 3".parse::<SimCommand>(), Ok(SimCommand::Down(3)));
        assert_eq!("U 0".parse::<SimCommand>(), Ok(SimCommand::Up(0)));
        assert_eq!("both 7".parse::<SimCommand>(), Ok(SimCommand::Both(7)));
        assert_eq!("release all".parse::<SimCommand>(), Ok(SimCommand::Release(None)));
        assert_eq!("release".parse::<SimCommand>(), Ok(SimCommand::Release(None)));
        assert_eq!("release 2".parse::<SimCommand>(), Ok(SimCommand::Release(Some(2))));
        assert_eq!("all-both".parse::<SimCommand>(), Ok(SimCommand::AllBoth));
        assert_eq!("status".parse::<SimCommand>(), Ok(SimCommand::Status));
        assert_eq!("quit".parse::<SimCommand>(), Ok(SimCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!("down".parse::<SimCommand>().is_err());
        assert!("down x".parse::<SimCommand>().is_err());
        assert!("jump 1".parse::<SimCommand>().is_err());
        assert!("".parse::<SimCommand>().is_err());
    }

    #[test]
    fn test_apply_sets_pins() {
        let config = AppConfig::from_yaml(CONFIG).unwrap();
        let mut bus = SimulatedBus::new(&[26, 27]);
        let sim = Simulator::new(bus.clone(), &config);

        sim.apply(&SimCommand::Up(1)).unwrap();
        assert_eq!(bus.read_board(27), Some(1 << 5));

        sim.apply(&SimCommand::Down(1)).unwrap();
        assert_eq!(bus.read_board(27), Some(1 << 4));

        sim.apply(&SimCommand::AllBoth).unwrap();
        assert_eq!(bus.read_board(26), Some(0b11));
        assert_eq!(bus.read_board(27), Some(0b11 << 4));

        sim.apply(&SimCommand::Release(Some(0))).unwrap();
        assert_eq!(bus.read_board(26), Some(0));

        sim.apply(&SimCommand::Release(None)).unwrap();
        assert_eq!(bus.read_board(27), Some(0));

        assert!(sim.apply(&SimCommand::Both(5)).is_err());
    }
}

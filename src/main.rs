//! Utensils Touch - capacitive slider to MIDI CC bridge
//!
//! Reads the touch sensor boards every loop cycle and sends slider values,
//! button presses and the collective toggle to the host as MIDI CCs.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use utensils_touch::calibration::{CalibrationAction, CalibrationScheduler};
use utensils_touch::config::AppConfig;
use utensils_touch::control_loop::{log_system_status, ControlLoop};
use utensils_touch::display::{slider_label, DisplaySink, JsonDisplay, LogDisplay};
use utensils_touch::midi::MidiMessage;
use utensils_touch::sensors::{MidiNoteBus, SensorBus, SimulatedBus};
use utensils_touch::simulator::{self, LoopRequest, Simulator};
use utensils_touch::transport::{self, CcTransport, MidirTransport, NullTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DisplayMode {
    /// One log line per change
    Log,
    /// JSON lines on stdout
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Utensils Touch - capacitive sliders to MIDI CC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CONFIG", default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Drive the sliders from an interactive prompt instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Slider status output
    #[arg(long, value_enum, default_value = "log")]
    display: DisplayMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&args.log_level, args.log_format, args.log_file.as_deref())?;

    info!("Starting Utensils Touch v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        let config = match AppConfig::load(&args.config).await {
            Ok(config) => Some(config),
            Err(e) => {
                debug!("No configured ports to highlight: {:#}", e);
                None
            }
        };
        let (inputs, outputs) = config
            .as_ref()
            .map(AppConfig::port_patterns)
            .unwrap_or_default();
        return transport::list_ports_formatted(&inputs, &outputs);
    }

    info!("Configuration file: {}", args.config);
    let config = AppConfig::load(&args.config).await?;
    info!("Configuration loaded: {} sliders", config.sliders.len());

    let control = ControlLoop::new(&config).context("Failed to build control loop")?;

    let transport: Box<dyn CcTransport> =
        match MidirTransport::connect(&config.midi.output_port, config.midi.channel) {
            Ok(t) => {
                info!("MIDI output ready on {} (channel {})", t.port_name(), config.midi.channel);
                Box::new(t)
            }
            Err(e) => {
                warn!("MIDI output unavailable, continuing without it: {:#}", e);
                Box::new(NullTransport)
            }
        };

    // Host feedback: keep the connection alive for the whole run
    let (host_tx, host_rx) = mpsc::channel::<MidiMessage>(256);
    let _host_conn = match &config.midi.input_port {
        Some(pattern) => match transport::connect_host_feedback(pattern, host_tx) {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Host feedback unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    let (sim_tx, sim_rx) = mpsc::channel::<LoopRequest>(16);
    let bus: Box<dyn SensorBus> = if args.simulate {
        let bus = SimulatedBus::new(&config.sensors.boards);
        let sim = Simulator::new(bus.clone(), &config);
        std::thread::spawn(move || {
            if let Err(e) = simulator::run_repl(sim, sim_tx) {
                warn!("Simulator prompt failed: {}", e);
            }
        });
        Box::new(bus)
    } else {
        let pattern = config.sensors.input_port.as_deref().context(
            "No sensor source configured: set sensors.input_port or run with --simulate",
        )?;
        Box::new(MidiNoteBus::connect(pattern, &config.sensors.boards)?)
    };
    info!("Sensor source: {}", bus.describe());

    let display: Box<dyn DisplaySink> = match args.display {
        DisplayMode::Log => Box::new(LogDisplay::new()),
        DisplayMode::Json => Box::new(JsonDisplay::stdout()),
    };

    let app = App {
        calibration: CalibrationScheduler::new(&config.calibration, Instant::now()),
        channel: config.midi.channel.saturating_sub(1),
        control,
        bus,
        transport,
        display,
    };

    run_app(app, &config, host_rx, sim_rx, shutdown_signal()).await?;

    info!("Utensils Touch shutdown complete");
    Ok(())
}

struct App {
    control: ControlLoop,
    bus: Box<dyn SensorBus>,
    transport: Box<dyn CcTransport>,
    display: Box<dyn DisplaySink>,
    calibration: CalibrationScheduler,
    /// 0-based host channel
    channel: u8,
}

impl App {
    fn tick(&mut self) {
        let now = Instant::now();

        for action in self.calibration.poll(now) {
            match action {
                CalibrationAction::Recalibrate => self.control.recalibrate(self.bus.as_mut()),
                CalibrationAction::HealthCheck => {
                    if self.control.health_check(self.bus.as_mut()) {
                        debug!("All sensor boards healthy");
                    }
                }
            }
        }

        self.control.step(
            now,
            self.bus.as_mut(),
            self.transport.as_mut(),
            self.display.as_mut(),
        );
    }

    fn on_host_message(&mut self, message: MidiMessage) {
        self.calibration.on_midi_received(Instant::now());

        if let MidiMessage::ControlChange { channel, cc, value } = message {
            if channel == self.channel && !self.control.sync_from_host(cc, value) {
                debug!("Ignoring host CC {} = {}", cc, value);
            }
        }
    }

    fn report_status(&self) {
        log_system_status(&self.control.system_status());
        if self.transport.is_connected() {
            info!("  MIDI output: CONNECTED");
        } else {
            warn!("  MIDI output: NOT CONNECTED - events are dropped");
        }
        info!(
            "  Startup calibration: {}",
            if self.calibration.startup_done() { "done" } else { "pending" }
        );
        let labels: Vec<String> = self
            .control
            .sliders()
            .iter()
            .map(|s| slider_label(&s.snapshot(true)))
            .collect();
        info!("Sliders: {}", labels.join("  "));
    }
}

async fn recv_optional<T>(rx: &mut mpsc::Receiver<T>, enabled: bool) -> Option<T> {
    if enabled {
        rx.recv().await
    } else {
        std::future::pending().await
    }
}

async fn run_app(
    mut app: App,
    config: &AppConfig,
    mut host_rx: mpsc::Receiver<MidiMessage>,
    mut sim_rx: mpsc::Receiver<LoopRequest>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting control loop ({:?} per tick)...", config.timing.loop_delay());

    // First pass detects which boards respond
    app.tick();
    app.report_status();

    let mut ticker = tokio::time::interval(config.timing.loop_delay());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut host_open = true;
    let mut sim_open = true;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => app.tick(),

            message = recv_optional(&mut host_rx, host_open) => match message {
                Some(message) => app.on_host_message(message),
                None => host_open = false,
            },

            request = recv_optional(&mut sim_rx, sim_open) => match request {
                Some(LoopRequest::Status) => app.report_status(),
                Some(LoopRequest::Quit) => {
                    info!("Simulator closed, stopping control loop");
                    break;
                }
                None => sim_open = false,
            },

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping control loop");
                break;
            }
        }
    }

    Ok(())
}

fn init_logging(
    level: &str,
    format: LogFormat,
    log_dir: Option<&str>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "utensils-touch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

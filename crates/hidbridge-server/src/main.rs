//! HID-Bridge server: entry point.
//!
//! Turns a Linux board with USB gadget support into a keyboard driven by a
//! remote peer. The peer connects over a serial Bluetooth link (exposed to
//! this process as a stream socket), sends JSON command scripts or plain
//! text, and the board types it into the USB host through `/dev/hidg0`.
//!
//! # Usage
//!
//! ```text
//! hidbridge [OPTIONS] [COMMAND]
//!
//! Commands:
//!   serve         Accept peers and execute what they send (default)
//!   demo          Run the built-in hardware test sequence
//!   run           Execute one script locally (--code or --script)
//!   init-config   Write the default config file
//!
//! Options:
//!   --config <PATH>   Config file [default: ~/.config/hidbridge/config.toml]
//!   --device <PATH>   HID gadget device [default: /dev/hidg0]
//!   --test-mode       Record reports instead of writing them
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Flag          |
//! |-----------------------|---------------|
//! | `HIDBRIDGE_CONFIG`    | `--config`    |
//! | `HIDBRIDGE_DEVICE`    | `--device`    |
//! | `HIDBRIDGE_TEST_MODE` | `--test-mode` |
//! | `HIDBRIDGE_BIND`      | `serve --bind`|
//! | `HIDBRIDGE_PORT`      | `serve --port`|
//!
//! CLI flags win over environment variables, which win over the config file.
//!
//! # Live or test mode
//!
//! Test mode swaps the gadget device for a recorder that logs each report in
//! hex; everything else runs unchanged. It is selected by `--test-mode`, by
//! `test_mode = true` in the config, or automatically when the device path
//! does not exist (unless `fallback_to_test_mode = false`, in which case a
//! missing device is a startup error).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hidbridge_core::script::{parse_action_code, to_action_code};
use hidbridge_core::{parse_script, ActionStep};
use hidbridge_server::application::demo::run_demo;
use hidbridge_server::application::interpret::{ActionInterpreter, ScriptReport};
use hidbridge_server::application::keyboard::KeyboardDriver;
use hidbridge_server::infrastructure::effector::gpio::GpioEffector;
use hidbridge_server::infrastructure::effector::simulated::SimulatedEffector;
use hidbridge_server::infrastructure::effector::HardwareEffector;
use hidbridge_server::infrastructure::hid::gadget::GadgetDevice;
use hidbridge_server::infrastructure::hid::recording::RecordingDevice;
use hidbridge_server::infrastructure::hid::{HidDevice, HidTransport};
use hidbridge_server::infrastructure::network::run_server;
use hidbridge_server::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig, DeviceConfig, EffectorBackend,
    EffectorConfig, NetworkConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote-driven USB keyboard for Linux HID gadget boards.
#[derive(Debug, Parser)]
#[command(
    name = "hidbridge",
    about = "Types remote command scripts into a USB host through a Linux HID gadget",
    version
)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true, env = "HIDBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// HID gadget character device.
    #[arg(long, global = true, env = "HIDBRIDGE_DEVICE")]
    device: Option<PathBuf>,

    /// Record reports instead of writing them to the device.
    #[arg(long, global = true, env = "HIDBRIDGE_TEST_MODE")]
    test_mode: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Accept peers and execute what they send (default).
    Serve(ServeArgs),
    /// Run the built-in hardware test sequence.
    Demo,
    /// Execute one script locally, without a peer.
    Run(RunArgs),
    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Default, Args)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "HIDBRIDGE_BIND")]
    bind: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "HIDBRIDGE_PORT")]
    port: Option<u16>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct RunArgs {
    /// Compact action code, e.g. `H"hello";W1;D5;K"ENTER"`.
    #[arg(long)]
    code: Option<String>,

    /// JSON command list.
    #[arg(long)]
    script: Option<String>,
}

impl Cli {
    /// Path of the config file in effect.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no config path given and no config directory"),
        }
    }

    /// Applies the global device flags on top of the loaded config.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(device) = &self.device {
            config.device.path = device.clone();
        }
        if self.test_mode {
            config.device.test_mode = true;
        }
    }
}

impl ServeArgs {
    fn bind_addr(&self, network: &NetworkConfig) -> anyhow::Result<SocketAddr> {
        let host = self.bind.as_deref().unwrap_or(&network.bind_address);
        let port = self.port.unwrap_or(network.port);
        format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid bind address: '{host}:{port}'"))
    }
}

impl RunArgs {
    fn steps(&self) -> anyhow::Result<Vec<ActionStep>> {
        match (&self.code, &self.script) {
            (Some(code), _) => parse_action_code(code).context("invalid action code"),
            (None, Some(script)) => parse_script(script).context("invalid JSON script"),
            (None, None) => bail!("either --code or --script is required"),
        }
    }
}

// ── Adapter selection ─────────────────────────────────────────────────────────

/// Picks the recorder or the gadget device according to the config.
///
/// # Errors
///
/// Fails when the device path is missing and falling back to test mode is
/// disabled.
fn select_device(config: &DeviceConfig) -> anyhow::Result<Box<dyn HidDevice>> {
    if config.test_mode {
        info!("test mode enabled; no HID output");
        return Ok(Box::new(RecordingDevice::new()));
    }
    if GadgetDevice::exists(&config.path) {
        info!("live mode; HID output to {}", config.path.display());
        return Ok(Box::new(GadgetDevice::new(config.path.clone())));
    }
    if config.fallback_to_test_mode {
        warn!(
            "{} not found; falling back to test mode",
            config.path.display()
        );
        return Ok(Box::new(RecordingDevice::new()));
    }
    bail!("HID device {} not found", config.path.display())
}

fn select_effector(config: &EffectorConfig) -> anyhow::Result<Arc<dyn HardwareEffector>> {
    match config.backend {
        EffectorBackend::Simulated => Ok(Arc::new(SimulatedEffector::new())),
        EffectorBackend::Gpio => {
            let gpio = GpioEffector::new(config.gpio_root.clone(), config.pins);
            gpio.export_all()
                .context("failed to set up GPIO lines for LEDs and buzzer")?;
            Ok(Arc::new(gpio))
        }
    }
}

fn log_report(report: &ScriptReport) {
    if report.failed_steps > 0 {
        warn!(
            "{} of {} steps had keyboard failures",
            report.failed_steps, report.steps
        );
    } else {
        info!("{} steps executed", report.steps);
    }
}

/// Writes the default config to `path`.
///
/// The existing file is never read, so `--force` also replaces a file that
/// no longer parses.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    save_config_to(&AppConfig::default(), path)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path()?;

    // Handled before loading so a broken file can be replaced.
    if let Some(Command::InitConfig { force }) = &cli.command {
        init_tracing(&AppConfig::default().server.log_level);
        init_config(&config_path, *force)?;
        info!("default config written to {}", config_path.display());
        return Ok(());
    }

    let mut config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    cli.apply_overrides(&mut config);
    init_tracing(&config.server.log_level);

    info!("HID-Bridge starting (config: {})", config_path.display());

    // ── Startup: device and effector ──────────────────────────────────────────
    let device = select_device(&config.device)?;
    let mut transport = HidTransport::new(device, config.transport_timing());
    transport
        .open()
        .with_context(|| format!("failed to open HID device {}", config.device.path.display()))?;

    let effector = select_effector(&config.effector)?;
    let keyboard = KeyboardDriver::new(transport, config.keyboard_timing());
    let mut interpreter = ActionInterpreter::new(keyboard, effector);

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let result = match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => match args.bind_addr(&config.network) {
            Ok(addr) => match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let stats = run_server(listener, &mut interpreter, running).await;
                    info!(
                        "served {} connections, executed {} scripts",
                        stats.connections_served, stats.scripts_executed
                    );
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(e)
                    .context(format!("failed to bind listener on {addr}"))),
            },
            Err(e) => Err(e),
        },
        Command::Demo => {
            let report = run_demo(&mut interpreter).await;
            log_report(&report);
            Ok(())
        }
        Command::Run(args) => match args.steps() {
            Ok(steps) => {
                if let Some(code) = to_action_code(&steps) {
                    debug!("running {code}");
                }
                let report = interpreter.execute(&steps).await;
                log_report(&report);
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::InitConfig { .. } => Ok(()),
    };

    // The device is released on every path out of here, errors included.
    interpreter.keyboard_mut().transport_mut().close();
    info!("HID-Bridge stopped");
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────

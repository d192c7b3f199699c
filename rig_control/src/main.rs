//! # Rig Control Binary
//!
//! Motion coordination and safety layer for the camera-probe gantry.
//! Speaks the newline-terminated host protocol on stdin/stdout and runs
//! the cooperative control cycle against the selected hardware backend.
//!
//! # Usage
//!
//! ```bash
//! # Run against the simulation backend with defaults
//! rig_control --simulate
//!
//! # Explicit configuration file
//! rig_control --config config/rig.toml -s
//!
//! # Verbose logging
//! rig_control -s -v
//! ```

#![deny(warnings)]

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use rig_common::config::RigConfig;
use rig_control::cycle::{ControlUnit, HostLink};
use rig_control::sim::SimHal;

/// Gantry motion coordination and safety layer
#[derive(Parser, Debug)]
#[command(name = "rig_control")]
#[command(version)]
#[command(about = "Camera-probe gantry control unit")]
#[command(long_about = None)]
struct Args {
    /// Path to the rig configuration file (rig.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run against the simulation backend
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("startup failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("rig_control v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            RigConfig::load(path)?
        }
        None => {
            info!("no configuration file given, using defaults");
            RigConfig::default()
        }
    };

    if !args.simulate {
        // Hardware drivers plug in behind the same trait; only the
        // simulation backend ships in this crate.
        warn!("no hardware backend selected, falling back to simulation");
    }
    let hal = SimHal::new_unhomed();

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    let mut unit = ControlUnit::new(config, hal)?;
    let mut link = StdioLink::spawn();
    unit.run(&mut link, running);

    info!("rig_control shutdown complete");
    Ok(())
}

/// Host link over stdin/stdout.
///
/// A reader thread feeds complete lines through a channel so the
/// control loop's poll never blocks on the terminal.
struct StdioLink {
    rx: mpsc::Receiver<String>,
}

impl StdioLink {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed, host link closed");
                        break;
                    }
                }
            }
        });
        Self { rx }
    }
}

impl HostLink for StdioLink {
    fn poll_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    fn send_line(&mut self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{line}").and_then(|_| stdout.flush()).is_err() {
            warn!("stdout write failed, response dropped");
        }
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

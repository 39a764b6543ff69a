//! `kida-cli` – operator console for the Kida robot.
//!
//! This binary wires the control core together and hands the terminal to
//! the operator.  It:
//!
//! 1. Checks for `~/.kida/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Connects the chassis (`dev00`) and accessory (`dev01`) boards over
//!    serial, or simulated boards with `--sim`, and starts one sensor reader
//!    per connected board.
//! 3. Drops the operator into an **interactive REPL** (see [`repl`]).
//! 4. Intercepts **Ctrl-C** to stop the robot and exit safely.

mod config;
mod repl;

use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kida_hal::{CommandDispatcher, SimBoards, SerialTransport};
use kida_perception::{BufLineSource, SensorReader, SensorStore};
use kida_runtime::telemetry::init_tracing;
use kida_runtime::{ManualDriver, ModeArbiter, StatusBoard};
use kida_types::DeviceId;
use tracing::{info, warn};

use crate::config::{Config, SerialConfig};
use crate::repl::Session;

/// Operator console for the Kida robot.
#[derive(Debug, Parser)]
#[command(name = "kida", version)]
struct Args {
    /// Use simulated boards instead of serial ports.
    #[arg(long)]
    sim: bool,
}

fn main() {
    let args = Args::parse();

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); KIDA_LOG_FORMAT=json switches to
    // JSON lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = init_tracing("kida");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }
    let cfg = config::resolve().unwrap_or_else(|e| {
        warn!(error = %e, "falling back to default configuration");
        let mut cfg = Config::default();
        config::apply_env_overrides(&mut cfg);
        cfg
    });

    // ── Boards ────────────────────────────────────────────────────────────
    let store = Arc::new(SensorStore::new());
    let (dispatcher, readers) = if args.sim {
        let (dispatcher, _log) = SimBoards::new().with_chassis().with_accessory().build();
        println!(
            "  {} simulated boards; inject sensor lines with {}.",
            "Using".yellow(),
            "/feed".bold()
        );
        (dispatcher, Vec::new())
    } else {
        connect_boards(&cfg.serial, &store)
    };
    let dispatcher = Arc::new(dispatcher);

    // ── Control core ──────────────────────────────────────────────────────
    let status = Arc::new(StatusBoard::new());
    let arbiter = Arc::new(ModeArbiter::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        status.clone(),
        cfg.autonomy.clone(),
    ));
    let driver = ManualDriver::new(
        Arc::clone(&dispatcher),
        arbiter.shared_mode(),
        cfg.speed.clone(),
    );
    info!(policy = %cfg.autonomy.policy, sim = args.sim, "control core ready");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let arbiter_ctrlc = Arc::clone(&arbiter);

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        arbiter_ctrlc.shutdown();
        shutdown_clone.store(true, Ordering::SeqCst);
        println!("{}", "  ✓ STOP sent.".green());
        println!("{}", "  ✓ Exiting Kida.".green());
        // stdin is still blocked in read_line; nothing else needs to run.
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the robot");
    }

    println!();
    println!("  Mode: {}", arbiter.mode().to_string().bold());
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let session = Session {
        arbiter: Arc::clone(&arbiter),
        driver,
        store,
        status,
    };
    repl::run(&session, shutdown);

    arbiter.shutdown();
    for reader in readers {
        reader.stop();
    }
}

/// Open each configured board, registering it with the dispatcher and
/// starting its sensor reader.  A board that cannot be opened is skipped.
fn connect_boards(
    serial: &SerialConfig,
    store: &Arc<SensorStore>,
) -> (CommandDispatcher, Vec<SensorReader>) {
    let mut dispatcher = CommandDispatcher::new();
    let mut readers = Vec::new();
    let boards = [
        (DeviceId::chassis(), serial.chassis_port.as_str()),
        (DeviceId::accessory(), serial.accessory_port.as_str()),
    ];

    for (id, path) in boards {
        print!("  Connecting {} on {} … ", id.to_string().bold(), path.dimmed());
        let transport =
            match SerialTransport::open(id.clone(), path, serial.baud_rate, serial.timeout()) {
                Ok(transport) => transport,
                Err(e) => {
                    println!("{}", "unavailable".red());
                    warn!(device = %id, error = %e, "board not connected");
                    continue;
                }
            };

        match transport.try_clone_port() {
            Ok(port) => {
                match SensorReader::spawn(id.clone(), BufLineSource::new(port), Arc::clone(store))
                {
                    Ok(reader) => readers.push(reader),
                    Err(e) => warn!(device = %id, error = %e, "sensor reader not started"),
                }
            }
            Err(e) => warn!(device = %id, error = %e, "sensor reader not started"),
        }
        dispatcher.register(Box::new(transport));
        println!("{}", "online".green());
    }

    if dispatcher.devices().is_empty() {
        println!(
            "  {}  Commands will be dropped. Try {} to run without hardware.",
            "No boards connected.".yellow(),
            "--sim".bold()
        );
    }
    (dispatcher, readers)
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Kida First-Run Wizard         ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Kida.\n");

    let mut cfg = Config::default();

    cfg.serial.chassis_port = prompt_line(
        &format!("  Chassis board port (dev00) [{}]: ", cfg.serial.chassis_port),
        &cfg.serial.chassis_port,
    );
    cfg.serial.accessory_port = prompt_line(
        &format!("  Accessory board port (dev01) [{}]: ", cfg.serial.accessory_port),
        &cfg.serial.accessory_port,
    );

    let baud = prompt_line(
        &format!("  Baud rate [{}]: ", cfg.serial.baud_rate),
        &cfg.serial.baud_rate.to_string(),
    );
    if let Ok(b) = baud.trim().parse::<u32>() {
        cfg.serial.baud_rate = b;
    }

    println!("  Autonomous policy?");
    println!("    1) Obstacle avoidance  (default)");
    println!("    2) Line following");
    println!("    3) PID line following");
    match prompt_line("  Enter choice [1]: ", "1").trim() {
        "2" => cfg.autonomy.policy = kida_runtime::PolicyKind::LineFollower,
        "3" => cfg.autonomy.policy = kida_runtime::PolicyKind::PidLineFollower,
        _ => cfg.autonomy.policy = kida_runtime::PolicyKind::ObstacleAvoidance,
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __ __ _     __    "#.bold().cyan());
    println!("{}", r#"  / //_/(_)___/ /__ _"#.bold().cyan());
    println!("{}", r#" / ,<  / / _  / _ `/"#.bold().cyan());
    println!("{}", r#"/_/|_|/_/\_,_/\_,_/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Kida".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Mobile robot control core");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

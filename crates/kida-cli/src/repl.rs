//! REPL – the operator console for a running robot.
//!
//! Supported commands:
//!   /help                 – show this list
//!   /manual               – take keyboard control
//!   /auto                 – hand control to the selected policy
//!   /policy <name>        – select `obstacle`, `line` or `pid`
//!   /status               – mode, policy, speed and latest status line
//!   /sensors              – last raw value of every sensor channel
//!   /feed [dev] <line>    – inject a board line (handy with `--sim`)
//!   /pad <x> <y>          – drive from gamepad stick axes
//!   /speed                – step the motor speed
//!   say <phrase>          – voice-style phrase, e.g. "go forward"
//!   w a s d x, forward …  – remote-shell drive words
//!   /quit | /exit | q     – stop the robot and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kida_perception::{Ingested, SensorStore, ingest_line};
use kida_runtime::manual::{gamepad_motion, interpret_phrase, parse_text_command};
use kida_runtime::{ManualDriver, ModeArbiter, PolicyKind, StatusBoard, TextCommand};
use kida_types::{Command, DeviceId, Mode, RawSensorReading, SensorChannel};

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Help,
    Manual,
    Auto,
    Policy(PolicyKind),
    Status,
    Sensors,
    Feed { device: DeviceId, line: String },
    Gamepad { x: f32, y: f32 },
    Speed,
    Drive(Command),
    Quit,
    Empty,
    /// Recognised command with bad arguments; carries the usage hint.
    Usage(&'static str),
    Unknown(String),
}

/// Parse one line of operator input.
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        "/help" => Input::Help,
        "/manual" => Input::Manual,
        "/auto" => Input::Auto,
        "/policy" => match rest.parse::<PolicyKind>() {
            Ok(kind) => Input::Policy(kind),
            Err(_) => Input::Usage("/policy <obstacle|line|pid>"),
        },
        "/status" => Input::Status,
        "/sensors" => Input::Sensors,
        "/feed" => parse_feed(rest),
        "/pad" => parse_pad(rest),
        "/speed" => Input::Speed,
        "/quit" | "/exit" => Input::Quit,
        "say" => match interpret_phrase(rest) {
            Some(text) => text_input(text),
            None => Input::Unknown(line.to_string()),
        },
        _ => match parse_text_command(line) {
            Some(text) => text_input(text),
            None => Input::Unknown(line.to_string()),
        },
    }
}

fn text_input(text: TextCommand) -> Input {
    match text {
        TextCommand::Drive(command) => Input::Drive(command),
        TextCommand::Quit => Input::Quit,
    }
}

fn parse_feed(rest: &str) -> Input {
    if rest.is_empty() {
        return Input::Usage("/feed [dev00|dev01] <line>");
    }
    let (device, line) = match rest.split_once(char::is_whitespace) {
        Some((dev, line)) if dev == DeviceId::CHASSIS || dev == DeviceId::ACCESSORY => {
            (DeviceId::new(dev), line.trim())
        }
        _ => (DeviceId::chassis(), rest),
    };
    Input::Feed {
        device,
        line: line.to_string(),
    }
}

fn parse_pad(rest: &str) -> Input {
    let mut axes = rest.split_whitespace().map(str::parse::<f32>);
    match (axes.next(), axes.next(), axes.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Input::Gamepad { x, y },
        _ => Input::Usage("/pad <x> <y>"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the console acts on.
pub struct Session {
    pub arbiter: Arc<ModeArbiter>,
    pub driver: ManualDriver,
    pub store: Arc<SensorStore>,
    pub status: Arc<StatusBoard>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "kida>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match parse_input(&line) {
            Input::Empty => {}
            Input::Help => cmd_help(),
            Input::Manual => cmd_manual(session),
            Input::Auto => cmd_auto(session),
            Input::Policy(kind) => {
                session.arbiter.set_policy(kind);
                println!("  Policy set to {}.", kind.to_string().bold());
                if session.arbiter.is_autonomous_running() {
                    println!("  {}", "Takes effect on the next /auto.".dimmed());
                }
            }
            Input::Status => cmd_status(session),
            Input::Sensors => cmd_sensors(session),
            Input::Feed { device, line } => cmd_feed(session, &device, &line),
            Input::Gamepad { x, y } => cmd_drive(session, gamepad_motion(x, y)),
            Input::Speed => {
                let speed = session.driver.increase_speed();
                println!("  Speed {}", speed.to_string().yellow());
            }
            Input::Drive(command) => cmd_drive(session, command),
            Input::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Input::Usage(usage) => println!("  {} {}", "Usage:".yellow(), usage.bold()),
            Input::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Kida Commands".bold().underline());
    println!("  {}            – take keyboard control", "/manual".bold().cyan());
    println!("  {}              – hand control to the selected policy", "/auto".bold().cyan());
    println!("  {}     – select obstacle, line or pid", "/policy <name>".bold().cyan());
    println!("  {}            – mode, policy, speed, latest status", "/status".bold().cyan());
    println!("  {}           – last raw sensor readings", "/sensors".bold().cyan());
    println!("  {} – inject a board line", "/feed [dev] <line>".bold().cyan());
    println!("  {}        – drive from gamepad axes", "/pad <x> <y>".bold().cyan());
    println!("  {}             – step the motor speed", "/speed".bold().cyan());
    println!("  {}      – phrase such as \"go forward\"", "say <phrase>".bold().cyan());
    println!("  {}         – drive words (also forward, left, stop …)", "w a s d x".bold().cyan());
    println!("  {}       – stop the robot and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_manual(session: &Session) {
    session.arbiter.enable_manual();
    session.driver.reset();
    println!("  {} control enabled.", "Keyboard".green().bold());
}

fn cmd_auto(session: &Session) {
    let policy = session.arbiter.policy();
    if session.arbiter.enable_autonomous() {
        println!("  {} control enabled ({policy}).", "Autonomous".green().bold());
    } else if session.arbiter.is_autonomous_running() {
        println!("  {}", "Autonomous mode already running.".yellow());
    } else {
        println!("  {}", "Could not start autonomous mode; see log.".red());
    }
}

fn cmd_status(session: &Session) {
    println!("  Mode   : {}", session.arbiter.mode().to_string().bold());
    println!("  Policy : {}", session.arbiter.policy());
    println!("  Speed  : {}", session.driver.speed());
    match session.status.latest() {
        Some(line) => println!("  Status : {line}"),
        None => println!("  Status : {}", "no decision yet".dimmed()),
    }
}

fn cmd_sensors(session: &Session) {
    let snapshot = session.store.snapshot();
    for channel in SensorChannel::ALL {
        let shown = match snapshot.get(&channel) {
            None | Some(RawSensorReading::Absent) => "–".dimmed().to_string(),
            Some(RawSensorReading::Text(raw)) => raw.clone(),
            Some(RawSensorReading::Number(n)) => n.to_string(),
        };
        println!("  {:<12} {shown}", channel.tag());
    }
}

fn cmd_feed(session: &Session, device: &DeviceId, line: &str) {
    match ingest_line(&session.store, device, line) {
        Ingested::Updated(n) => println!("  {n} channel(s) updated."),
        Ingested::Alert(alert) => println!("  {} {alert}", "Alert:".yellow().bold()),
        Ingested::Unrecognised => println!("  {}", "Nothing recognised in that line.".dimmed()),
    }
}

fn cmd_drive(session: &Session, command: Command) {
    if session.arbiter.mode() != Mode::Manual {
        println!(
            "  {} {} not sent; switch to {} first.",
            "Ignored:".yellow(),
            command,
            "/manual".bold()
        );
        return;
    }
    session.driver.drive(command);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_input("/help"), Input::Help);
        assert_eq!(parse_input("  /manual "), Input::Manual);
        assert_eq!(parse_input("/auto"), Input::Auto);
        assert_eq!(parse_input("/status"), Input::Status);
        assert_eq!(parse_input("/sensors"), Input::Sensors);
        assert_eq!(parse_input("/speed"), Input::Speed);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input(""), Input::Empty);
    }

    #[test]
    fn policy_requires_a_known_name() {
        assert_eq!(parse_input("/policy pid"), Input::Policy(PolicyKind::PidLineFollower));
        assert_eq!(parse_input("/policy line"), Input::Policy(PolicyKind::LineFollower));
        assert!(matches!(parse_input("/policy"), Input::Usage(_)));
        assert!(matches!(parse_input("/policy wander"), Input::Usage(_)));
    }

    #[test]
    fn feed_defaults_to_the_chassis() {
        assert_eq!(
            parse_input("/feed LASER:111"),
            Input::Feed {
                device: DeviceId::chassis(),
                line: "LASER:111".into()
            }
        );
        assert_eq!(
            parse_input("/feed dev01 MOTION:0 | LF[L:120 M:80 R:40]"),
            Input::Feed {
                device: DeviceId::accessory(),
                line: "MOTION:0 | LF[L:120 M:80 R:40]".into()
            }
        );
        assert!(matches!(parse_input("/feed"), Input::Usage(_)));
    }

    #[test]
    fn gamepad_axes_parse() {
        assert_eq!(parse_input("/pad 0 -0.9"), Input::Gamepad { x: 0.0, y: -0.9 });
        assert!(matches!(parse_input("/pad 0"), Input::Usage(_)));
        assert!(matches!(parse_input("/pad a b"), Input::Usage(_)));
    }

    #[test]
    fn drive_words_and_phrases() {
        assert_eq!(parse_input("w"), Input::Drive(Command::Forward));
        assert_eq!(parse_input("LEFT"), Input::Drive(Command::Left));
        assert_eq!(parse_input("x"), Input::Drive(Command::Stop));
        assert_eq!(parse_input("q"), Input::Quit);
        assert_eq!(parse_input("say please go back"), Input::Drive(Command::Backward));
        assert_eq!(parse_input("say time to exit"), Input::Quit);
        assert!(matches!(parse_input("say hello"), Input::Unknown(_)));
        assert!(matches!(parse_input("dance"), Input::Unknown(_)));
    }
}

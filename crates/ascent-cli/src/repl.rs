//! REPL – interactive flight console.
//!
//! Supported slash-commands:
//!   /help                 – show this list
//!   /start                – run preflight and start the ascent
//!   /abort [reason]       – switch to the abort script
//!   /throttle <0..1|off>  – pin or release the throttle
//!   /brakes <on|off|auto> – pin or release the brakes
//!   /status               – altitude, speed and control surfaces
//!   /parts                – tagged parts discovered on the vessel
//!   /quit | /exit         – stop the flight computer and exit
//!
//! Ctrl-C at the prompt aborts the flight; Ctrl-D exits.

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use ascent_hal::Component;
use ascent_link::VesselLink;
use ascent_types::{OverrideChannel, paths};

use crate::session::Session;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Start,
    Abort(String),
    Throttle(Option<f64>),
    Brakes(Option<bool>),
    Status,
    Parts,
    Quit,
}

/// Parse one input line.  `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (head, rest.as_slice()) {
        ("/help", _) => Command::Help,
        ("/start", []) => Command::Start,
        ("/abort", []) => Command::Abort("operator abort".to_string()),
        ("/abort", reason) => Command::Abort(reason.join(" ")),
        ("/throttle", ["off"]) => Command::Throttle(None),
        ("/throttle", [value]) => match value.parse::<f64>() {
            Ok(v) if (0.0..=1.0).contains(&v) => Command::Throttle(Some(v)),
            _ => return Err(format!("throttle must be between 0 and 1, got '{value}'")),
        },
        ("/brakes", ["on"]) => Command::Brakes(Some(true)),
        ("/brakes", ["off"]) => Command::Brakes(Some(false)),
        ("/brakes", ["auto"]) => Command::Brakes(None),
        ("/status", []) => Command::Status,
        ("/parts", []) => Command::Parts,
        ("/quit" | "/exit", []) => Command::Quit,
        ("/throttle", _) => return Err("usage: /throttle <0..1|off>".to_string()),
        ("/brakes", _) => return Err("usage: /brakes <on|off|auto>".to_string()),
        (other, _) => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(command))
}

/// Entry point for the interactive REPL.  Returns when the operator quits
/// or the flight computer stops on its own.
pub fn run(session: &Session) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if session.is_finished() {
            println!("{}", "Flight computer stopped.".yellow());
            break;
        }

        let line = match editor.readline(&format!("{} ", "ascent>".bold().cyan())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                cmd_abort(session, "operator Ctrl-C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let _ = editor.add_history_entry(line.as_str());

        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(Command::Help)) => cmd_help(),
            Ok(Some(Command::Start)) => cmd_start(session),
            Ok(Some(Command::Abort(reason))) => cmd_abort(session, &reason),
            Ok(Some(Command::Throttle(value))) => {
                cmd_override(session, OverrideChannel::Throttle, value)
            }
            Ok(Some(Command::Brakes(engaged))) => cmd_override(
                session,
                OverrideChannel::Brakes,
                engaged.map(|on| if on { 1.0 } else { 0.0 }),
            ),
            Ok(Some(Command::Status)) => cmd_status(session),
            Ok(Some(Command::Parts)) => cmd_parts(session),
            Ok(Some(Command::Quit)) => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Err(message) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                message,
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Ascent Commands".bold().underline());
    println!("  {}                 – run preflight and start the ascent", "/start".bold().cyan());
    println!("  {}       – switch to the abort script", "/abort [reason]".bold().cyan());
    println!("  {}  – pin or release the throttle", "/throttle <0..1|off>".bold().cyan());
    println!("  {} – pin or release the brakes", "/brakes <on|off|auto>".bold().cyan());
    println!("  {}                – altitude, speed and controls", "/status".bold().cyan());
    println!("  {}                 – tagged parts on the vessel", "/parts".bold().cyan());
    println!("  {}         – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_start(session: &Session) {
    if session.operator.start_sequence() {
        println!("{}", "  Start requested; preflight runs on the next cycle.".green());
    } else {
        println!("{}", "  Flight computer is not running.".red());
    }
}

fn cmd_abort(session: &Session, reason: &str) {
    if session.operator.abort(reason) {
        println!("{}", "  Abort requested.".yellow().bold());
    } else {
        println!("{}", "  Flight computer is not running.".red());
    }
}

fn cmd_override(session: &Session, channel: OverrideChannel, value: Option<f64>) {
    if !session.operator.set_manual_override(channel, value) {
        println!("{}", "  Flight computer is not running.".red());
    }
}

fn cmd_status(session: &Session) {
    let sim = &session.sim;
    let read = |path: &str| {
        sim.scalar_property(path)
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "n/a".to_string())
    };
    println!();
    println!("{}", "Vessel Status".bold().underline());
    println!("  Altitude       : {} m", read(paths::MEAN_ALTITUDE).yellow());
    println!("  Vertical speed : {} m/s", read(paths::VERTICAL_SPEED).yellow());
    println!("  Throttle       : {:.2}", sim.throttle());
    println!("  Brakes         : {}", if sim.brakes() { "on" } else { "off" });
    println!("  SAS            : {}", if sim.sas() { "on" } else { "off" });
    println!("  Stages fired   : {}", sim.stages_activated());
    println!();
}

fn cmd_parts(session: &Session) {
    let remote = match session.sim.enumerate_components() {
        Ok(remote) => remote,
        Err(e) => {
            println!("{}: {}", "Enumeration failed".red(), e);
            return;
        }
    };
    println!();
    println!("{}", "Tagged Parts".bold().underline());
    for component in remote.iter().filter_map(Component::discover) {
        println!(
            "  {:<12} {:<12} {}",
            component.tag().bold(),
            component.kind().to_string().cyan(),
            component.name().dimmed()
        );
    }
    println!();
}

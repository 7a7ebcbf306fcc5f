//! `ascent` – launch console for the ascent flight computer.
//!
//! This binary flies the built-in (or a configured) ascent profile against
//! the in-process simulated vessel.  It:
//!
//! 1. Checks for `~/.ascent/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Starts the flight computer, the simulator physics and an event printer
//!    on a tokio runtime.
//! 3. Drops the operator into an **interactive REPL** (`/start`, `/abort`,
//!    `/throttle`, `/status`, ...), or with `--headless` starts the sequence
//!    at once and exits when it finishes.
//! 4. Intercepts **Ctrl-C** to queue an abort; a second Ctrl-C stops the
//!    flight computer.

mod config;
mod demo;
mod repl;
mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ascent_kernel::SequenceState;
use colored::Colorize;
use tracing::warn;

use crate::config::{Config, HoldMode};
use crate::session::Session;

fn main() {
    let _tracing = ascent_runtime::init_tracing("ascent");
    let headless = std::env::args().skip(1).any(|arg| arg == "--headless");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) if headless => Config::default(),
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            std::process::exit(1);
        }
    };

    let session = match Session::launch(&cfg, runtime.handle(), headless) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}: {}", "Cannot build flight computer".red(), e);
            std::process::exit(1);
        }
    };
    install_ctrlc_handler(&session);

    if headless {
        session.operator.start_sequence();
    } else {
        println!(
            "\n  Profile ready, hold loop: {}.  Type {} for a list of commands.\n",
            cfg.hold.to_string().bold(),
            "/help".bold().cyan()
        );
        repl::run(&session);
    }

    let computer = runtime.block_on(async {
        if headless {
            while !session.is_finished() {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
        session.finish().await
    });

    let state = computer.map(|c| c.sequence_state());
    println!("  Final state: {}", format!("{state:?}").bold());
    if headless && state != Some(SequenceState::Completed) {
        std::process::exit(1);
    }
}

/// First Ctrl-C queues an abort, the second one stops the flight computer.
fn install_ctrlc_handler(session: &Session) {
    let operator = session.operator.clone();
    let shutdown = session.shutdown_handle();
    let pressed = Arc::new(AtomicBool::new(false));

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        if pressed.swap(true, Ordering::SeqCst) {
            println!("{}", "⚠  Second Ctrl-C – stopping the flight computer …".yellow().bold());
            shutdown.send_replace(true);
        } else {
            println!("{}", "⚠  Ctrl-C received – aborting the flight …".yellow().bold());
            operator.abort("operator Ctrl-C");
        }
    }) {
        warn!(
            error = %e,
            "Failed to install Ctrl-C handler; abort on Ctrl-C will not be available"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Ascent First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the flight computer.\n");

    let mut cfg = Config::default();

    println!("  Which hold loop should run during the ascent?");
    println!("    1) None – the profile drives the throttle  (default)");
    println!("    2) Vertical velocity hold");
    println!("    3) Altitude hold");
    cfg.hold = match prompt_line("  Enter choice [1]: ", "1").as_str() {
        "2" => HoldMode::Velocity,
        "3" => HoldMode::Altitude,
        _ => HoldMode::None,
    };

    let cycle = prompt_line(
        &format!("  Control cycle period in ms [{}]: ", cfg.cycle_ms),
        &cfg.cycle_ms.to_string(),
    );
    if let Ok(ms) = cycle.parse::<u64>() {
        cfg.cycle_ms = ms;
    }

    let tuning = prompt_line("  Tuning file (empty for in-memory): ", "");
    if !tuning.is_empty() {
        cfg.tuning_file = Some(tuning.into());
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                    __ "#.bold().cyan());
    println!("{}", r#"  / _ | ___ _______ ___  / /_"#.bold().cyan());
    println!("{}", r#" / __ |(_-</ __/ -_) _ \/ __/"#.bold().cyan());
    println!("{}", r#"/_/ |_/___/\__/\__/_//_/\__/ "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Ascent".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Launch sequencing and hold-loop flight computer");
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

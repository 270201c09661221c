//! `kinesis` – operator binary for the Kinesis control loop.
//!
//! 1. Loads `~/.kinesis/config.toml` (writing the defaults on first run) and
//!    applies `KINESIS_*` environment overrides.
//! 2. Starts every subsystem through the [`Orchestrator`] and registers the
//!    configured movement patterns.
//! 3. Optionally drives the sensor hub with a simulated feed.
//! 4. Reads operator commands from stdin until `quit`, end of input followed
//!    by Ctrl-C, or Ctrl-C.
//! 5. Shuts everything down in order.

mod config;
mod console;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use kinesis_runtime::Orchestrator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

fn main() {
    // Tracing first: the OTLP simple exporter does not need the runtime.
    let _telemetry = kinesis_runtime::telemetry::init_tracing("kinesis");

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  Default config written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("  {}: {}", "Could not write config".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("  {}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("kinesis-worker")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the async runtime".red(), e);
            std::process::exit(1);
        }
    };

    runtime.block_on(run(cfg));
    // A pending stdin read would otherwise keep the runtime alive.
    runtime.shutdown_timeout(Duration::from_secs(1));
}

async fn run(cfg: config::Config) {
    let orch = Arc::new(Orchestrator::new(cfg.system.clone()));
    for pattern in &cfg.patterns {
        orch.motion().register_pattern(pattern.to_pattern());
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let stop_ctrlc = Arc::clone(&stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – initiating graceful shutdown …"
                .yellow()
                .bold()
        );
        stop_ctrlc.send_replace(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use `quit` to exit");
    }

    // ── Background tasks ──────────────────────────────────────────────────
    let feed = cfg.simulate.then(|| {
        tokio::spawn(sim::run(
            Arc::clone(&orch),
            Duration::from_millis(cfg.sim_period_ms.max(1)),
            stop_rx.clone(),
        ))
    });
    let reporter = tokio::spawn(report_status(
        Arc::clone(&orch),
        Duration::from_secs(cfg.status_interval_secs.max(1)),
        stop_rx.clone(),
    ));

    println!();
    println!(
        "  {} motor(s), {} pattern(s), simulation {}",
        orch.motion().motor_ids().len(),
        orch.motion().pattern_names().len(),
        if cfg.simulate {
            "on".green()
        } else {
            "off".dimmed()
        }
    );
    println!("  Type {} for a list of commands.\n", "help".bold().cyan());

    // ── Console ───────────────────────────────────────────────────────────
    read_commands(&orch, stop_rx).await;

    // ── Shutdown ──────────────────────────────────────────────────────────
    stop_tx.send_replace(true);
    if let Some(feed) = feed
        && let Err(e) = feed.await
    {
        warn!(error = %e, "sensor feed ended abnormally");
    }
    if let Err(e) = reporter.await {
        warn!(error = %e, "status reporter ended abnormally");
    }
    orch.shutdown().await;
    console::print_status(&orch.status());
    println!("{}", "  ✓ Exiting Kinesis.".green());
}

async fn read_commands(orch: &Orchestrator, mut stop: watch::Receiver<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match console::parse(&line) {
                        Ok(command) => {
                            if !console::execute(orch, command).await {
                                return;
                            }
                        }
                        Err(e) => println!("  {} {}", "✗".red().bold(), e),
                    }
                }
                Ok(None) => {
                    info!("stdin closed; press Ctrl-C to stop");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "stdin unreadable; press Ctrl-C to stop");
                    break;
                }
            }
        }
    }
    // Keep the loop running headless until Ctrl-C.
    while stop.changed().await.is_ok() {
        if *stop.borrow() {
            return;
        }
    }
}

async fn report_status(orch: Arc<Orchestrator>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let status = orch.status();
                info!(
                    safety = %status.safety_level,
                    behavior = %status.behavior,
                    warnings = status.warnings,
                    uptime_s = status.uptime.as_secs(),
                    "status"
                );
            }
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __ __ _             _     "#.bold().cyan());
    println!("{}", r#"  / //_/(_)__  ___ ___ (_)__ "#.bold().cyan());
    println!("{}", r#" / ,<  / / _ \/ -_|_-</ (_-< "#.bold().cyan());
    println!("{}", r#"/_/|_|/_/_//_/\__/___/_/___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Kinesis".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sensor, actuator and safety control loop");
    println!();
}

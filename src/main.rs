//! Launchkit - Python Application Launcher
//!
//! Entry point: parses arguments, sets up logging, loads the launcher
//! configuration and runs the requested command. The process exit code is
//! the launched program's own code, or a launcher failure code.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use launchkit::bootstrap::{Bootstrapper, ReadinessReport};
use launchkit::cli::{Args, Commands};
use launchkit::config::{Config, CONFIG_FILE_NAME};
use launchkit::console;
use launchkit::error::LaunchError;
use launchkit::process::SystemRunner;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let base_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Cannot determine the working directory: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging to both console and file
    let guard = match setup_logging(&base_dir, args.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {}", e);
            None
        }
    };

    let code = execute(&args, &base_dir).await;

    // Flush the file log before exiting
    drop(guard);
    std::process::exit(code);
}

/// Run the selected command and turn its result into an exit code
async fn execute(args: &Args, base_dir: &Path) -> i32 {
    // Failures before the configuration is known still keep the window open
    let config = match Config::load(args.config.as_deref(), base_dir) {
        Ok(config) => config,
        Err(e) => return fail(&e, true),
    };
    let pause_on_failure = config.launch.pause_on_failure;

    match dispatch(args.command(), config, base_dir).await {
        Ok(code) => code,
        Err(e) => fail(&e, pause_on_failure),
    }
}

fn fail(err: &LaunchError, pause: bool) -> i32 {
    error!("{}", err);
    console::report_failure(err);
    if pause {
        console::pause();
    }
    err.exit_code()
}

async fn dispatch(command: Commands, config: Config, base_dir: &Path) -> launchkit::error::Result<i32> {
    let runner = Arc::new(SystemRunner);

    match command {
        Commands::Run { profile, args } => {
            let selected = config.profile(profile.as_deref())?.clone();
            info!(
                "Starting profile '{}' ({})",
                profile.as_deref().unwrap_or(&config.default_profile),
                selected.entry_point.display()
            );

            let bootstrapper = Bootstrapper::new(config, base_dir, runner);
            let outcome = bootstrapper.run(&selected, &args).await?;
            for action in &outcome.actions {
                info!("Setup performed: {:?}", action);
            }
            if outcome.hold_terminal {
                console::pause();
            }
            Ok(outcome.exit_code)
        }
        Commands::Check { profile, json } => {
            let selected = config.profile(profile.as_deref())?.clone();
            let bootstrapper = Bootstrapper::new(config, base_dir, runner);
            let report = bootstrapper.check(&selected).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(if report.is_ready() { 0 } else { 1 })
        }
        Commands::Profiles => {
            println!("\nLaunch Profiles:");
            println!("{:<14} {:<18} {:<8} {:<8} {}", "Name", "Entry Point", "Args", "FFmpeg", "Description");
            println!("{}", "-".repeat(80));

            for (name, profile) in &config.profiles {
                let marker = if *name == config.default_profile { "*" } else { " " };
                println!(
                    "{}{:<13} {:<18} {:<8} {:<8} {}",
                    marker,
                    name,
                    profile.entry_point.display(),
                    yes_no(profile.forward_args),
                    yes_no(profile.requires_external_tool),
                    profile.description
                );
            }
            println!("\n* default profile");
            Ok(0)
        }
        Commands::InstallFfmpeg => {
            let bootstrapper = Bootstrapper::new(config, base_dir, runner);
            bootstrapper.install_external_tool().await?;
            Ok(0)
        }
        Commands::Init { force } => {
            let path = base_dir.join(CONFIG_FILE_NAME);
            if path.exists() && !force {
                return Err(LaunchError::Config(format!(
                    "{} already exists; use --force to overwrite it",
                    path.display()
                )));
            }
            config.save_to_file(&path)?;
            console::notice(&format!("Wrote {}", path.display()));
            Ok(0)
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn mark(ok: bool) -> &'static str {
    if ok { "OK" } else { "MISSING" }
}

fn print_report(report: &ReadinessReport) {
    println!("\nReadiness Check:");
    println!("{}", "-".repeat(60));

    match (&report.interpreter, &report.interpreter_error) {
        (Some(interpreter), _) => println!(
            "{:<8} Python {} ({})",
            "OK",
            interpreter.version,
            interpreter
                .location
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| interpreter.program.clone())
        ),
        (None, Some(e)) => println!("{:<8} {}", "MISSING", e),
        (None, None) => println!("{:<8} Python", "MISSING"),
    }

    println!(
        "{:<8} Virtual environment {}",
        mark(report.environment_present),
        report.environment.display()
    );

    for capability in &report.capabilities {
        println!(
            "{:<8} {} (import {})",
            mark(capability.present),
            capability.name,
            capability.module
        );
    }

    if let Some(status) = &report.external_tool {
        println!("{:<8} FFmpeg", mark(status.is_available()));
    }

    println!(
        "{:<8} Entry point {}",
        mark(report.entry_point_present),
        report.entry_point.display()
    );

    println!("{}", "-".repeat(60));
    if report.is_ready() {
        println!("Ready to launch.");
    } else {
        println!("Not ready yet: running the launcher will try to fix what it can.");
    }
}

/// Setup logging to both console and file
fn setup_logging(base_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    let log_dir = base_dir.join(".launchkit").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "launchkit.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let filter = log_filter(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    // Setup layered subscriber
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    // Initialize the subscriber
    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - file: {}",
        log_dir.join("launchkit.log").display()
    );

    Ok(guard)
}

/// `RUST_LOG` when set and valid, otherwise info (debug with `--verbose`)
fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };

    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid {}: {}", EnvFilter::DEFAULT_ENV, e);
            EnvFilter::new(default_level)
        }),
        None => EnvFilter::new(default_level),
    }
}

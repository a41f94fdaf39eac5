//! Telegram Relay Daemon - Rust implementation
//!
//! CLI and daemon for forwarding fresh messages between Telegram groups.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use clap::{Parser, Subcommand};
use telegram_relay_rs::config::{Config, Paths, CONFIG_FILE};
use telegram_relay_rs::{daemon, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Telegram Relay - channel forwarding daemon
#[derive(Parser)]
#[command(name = "telegram-relay-rs")]
#[command(about = "Forward fresh messages between Telegram groups")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon in the background
    Start,

    /// Stop the daemon
    Stop,

    /// Show daemon status
    Status,

    /// Tail the log file
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: u32,

        /// Don't follow the log
        #[arg(long = "no-follow")]
        no_follow: bool,
    },

    /// Run the daemon in the foreground (internal)
    #[command(hide = true)]
    Run,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let paths = Paths::default();

    let result = match cli.command {
        Commands::Start => cmd_start(&paths, &cli.config),
        Commands::Stop => cmd_stop(&paths),
        Commands::Status => cmd_status(&paths, &cli.config),
        Commands::Logs { lines, no_follow } => cmd_logs(&paths, lines, !no_follow),
        Commands::Run => cmd_run(&cli.config),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

// ============================================================================
// Daemon management
// ============================================================================

fn get_pid(paths: &Paths) -> Option<u32> {
    let pid_file = paths.pid_file();
    if !pid_file.exists() {
        return None;
    }

    let content = fs::read_to_string(&pid_file).ok()?;
    let pid: u32 = content.trim().parse().ok()?;

    // Check if process is running
    let status = Command::new("kill").args(["-0", &pid.to_string()]).status();

    if status.map(|s| s.success()).unwrap_or(false) {
        Some(pid)
    } else {
        // PID file exists but process is dead
        let _ = fs::remove_file(&pid_file);
        None
    }
}

fn cmd_start(paths: &Paths, config_path: &PathBuf) -> Result<()> {
    if let Some(pid) = get_pid(paths) {
        println!("Daemon already running (PID {})", pid);
        return Ok(());
    }

    // Validate the config up front so a bad file fails here, not in the
    // detached child.
    Config::load(config_path)?;

    fs::create_dir_all(&paths.state_dir)?;
    fs::create_dir_all(&paths.logs_dir)?;

    let log_file = paths.log_file();
    let log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    let exe = std::env::current_exe()?;
    let child = Command::new(&exe)
        .arg("run")
        .arg("--config")
        .arg(config_path)
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log))
        .spawn()?;

    fs::write(paths.pid_file(), child.id().to_string())?;

    println!("Daemon started (PID {})", child.id());
    println!("Logs: {}", log_file.display());

    Ok(())
}

fn cmd_stop(paths: &Paths) -> Result<()> {
    let pid = match get_pid(paths) {
        Some(p) => p,
        None => {
            println!("Daemon not running");
            return Ok(());
        }
    };

    println!("Stopping daemon (PID {})...", pid);

    let _ = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    // Wait for it to die
    for _ in 0..10 {
        std::thread::sleep(Duration::from_millis(500));
        let status = Command::new("kill").args(["-0", &pid.to_string()]).status();
        if !status.map(|s| s.success()).unwrap_or(false) {
            break;
        }
    }

    // Force kill if still running
    let status = Command::new("kill").args(["-0", &pid.to_string()]).status();
    if status.map(|s| s.success()).unwrap_or(false) {
        println!("Force killing...");
        let _ = Command::new("kill")
            .args(["-KILL", &pid.to_string()])
            .status();
    }

    let _ = fs::remove_file(paths.pid_file());

    println!("Daemon stopped");
    Ok(())
}

fn cmd_status(paths: &Paths, config_path: &PathBuf) -> Result<()> {
    match get_pid(paths) {
        Some(pid) => println!("Daemon running (PID {})", pid),
        None => println!("Daemon not running"),
    }

    if let Ok(config) = Config::load(config_path) {
        println!("\nConfigured pairs (refresh every {}s):", config.refresh_rate);
        for pair in &config.groups {
            println!("  {} -> {}", pair.source_group, pair.target_group);
        }
    }

    Ok(())
}

fn cmd_logs(paths: &Paths, lines: u32, follow: bool) -> Result<()> {
    let log_file = paths.log_file();
    if !log_file.exists() {
        println!("Log file not found: {}", log_file.display());
        return Ok(());
    }

    let mut cmd = Command::new("tail");
    if follow {
        cmd.arg("-f");
    }
    cmd.args(["-n", &lines.to_string()]);
    cmd.arg(&log_file);

    let _ = cmd.status();
    Ok(())
}

// ============================================================================
// Foreground daemon
// ============================================================================

fn cmd_run(config_path: &PathBuf) -> Result<()> {
    info!("Telegram relay daemon starting (Rust)");
    info!("Turn off 2FA, if it's enabled!");

    let config = Config::load(config_path)?;
    info!(
        "Loaded config: {} pairs, refresh every {}s",
        config.groups.len(),
        config.refresh_rate
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(daemon::run(&config))?;

    info!("Daemon ended successfully");
    Ok(())
}

//! Zentinel Security Monitor CLI
//!
//! Replays JSON-lines security events through a monitor and prints one
//! decision per line. Logs go to stderr as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use tracing::{error, info};

use zentinel_security_monitor::replay;
use zentinel_security_monitor::{MonitorConfig, MonitorConfigJson, SecurityMonitor};

/// Version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "zentinel-security-monitor")]
#[command(about = "Replay security events through the Zentinel security monitor")]
struct Args {
    /// JSON-lines command file (stdin if omitted)
    #[arg(short, long, env = "SECMON_INPUT")]
    input: Option<PathBuf>,

    /// Output file for decisions (stdout if omitted)
    #[arg(short, long, env = "SECMON_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, env = "SECMON_CONFIG")]
    config: Option<PathBuf>,

    /// Failed logins before lockout
    #[arg(long, env = "SECMON_MAX_LOGIN_ATTEMPTS")]
    max_login_attempts: Option<usize>,

    /// Lockout window in seconds
    #[arg(long, env = "SECMON_LOCKOUT_DURATION")]
    lockout_duration_seconds: Option<u64>,

    /// Requests per subject and resource per minute
    #[arg(long, env = "SECMON_RATE_LIMIT")]
    rate_limit_per_minute: Option<usize>,

    /// PBKDF2 iteration count
    #[arg(long, env = "SECMON_KDF_ITERATIONS")]
    kdf_iterations: Option<u32>,

    /// Add a block-list entry on brute-force lockout
    #[arg(long, env = "SECMON_BLOCK_ON_LOCKOUT")]
    block_on_lockout: bool,

    /// Clear the failure window on successful login
    #[arg(long, env = "SECMON_CLEAR_ON_SUCCESS")]
    clear_failures_on_success: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "SECMON_VERBOSE")]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open config file {}", path.display()))?;
                let json: MonitorConfigJson = serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("failed to parse config file {}", path.display()))?;
                MonitorConfig::from(json)
            }
            None => MonitorConfig::default(),
        };

        if let Some(v) = self.max_login_attempts {
            config.max_login_attempts = v;
        }
        if let Some(v) = self.lockout_duration_seconds {
            config.lockout_duration_seconds = v;
        }
        if let Some(v) = self.rate_limit_per_minute {
            config.rate_limit_per_minute = v;
        }
        if let Some(v) = self.kdf_iterations {
            config.kdf_iterations = v;
        }
        config.brute_force.block_on_lockout |= self.block_on_lockout;
        config.brute_force.clear_failures_on_success |= self.clear_failures_on_success;

        Ok(config)
    }
}

/// Install panic hook for production diagnostics
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("Unknown panic payload");

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        eprintln!("PANIC: security monitor panicked at {}: {}", location, payload);

        error!(
            panic_payload = %payload,
            panic_location = %location,
            "Security monitor panicked"
        );

        default_hook(panic_info);
    }));
}

fn main() -> Result<()> {
    install_panic_hook();

    let args = Args::parse();

    // Decisions go to stdout, so logs go to stderr
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .with_writer(io::stderr)
        .json()
        .init();

    info!(version = VERSION, "Starting Zentinel security monitor");

    let config = args.to_config()?;

    info!(
        max_login_attempts = config.max_login_attempts,
        lockout_duration_seconds = config.lockout_duration_seconds,
        rate_limit_per_minute = config.rate_limit_per_minute,
        kdf_iterations = config.kdf_iterations,
        block_on_lockout = config.brute_force.block_on_lockout,
        clear_failures_on_success = config.brute_force.clear_failures_on_success,
        "Configuration loaded"
    );

    let monitor = SecurityMonitor::new(config).map_err(|e| {
        error!(error = %e, "Failed to initialize security monitor");
        e
    })?;

    let stats = match (&args.input, &args.output) {
        (Some(input), Some(output)) => {
            let input = File::open(input)
                .with_context(|| format!("failed to open input {}", input.display()))?;
            let output = File::create(output)
                .with_context(|| format!("failed to create output {}", output.display()))?;
            replay::run(&monitor, BufReader::new(input), BufWriter::new(output))?
        }
        (Some(input), None) => {
            let input = File::open(input)
                .with_context(|| format!("failed to open input {}", input.display()))?;
            replay::run(&monitor, BufReader::new(input), BufWriter::new(io::stdout().lock()))?
        }
        (None, Some(output)) => {
            let output = File::create(output)
                .with_context(|| format!("failed to create output {}", output.display()))?;
            replay::run(&monitor, io::stdin().lock(), BufWriter::new(output))?
        }
        (None, None) => replay::run(&monitor, io::stdin().lock(), BufWriter::new(io::stdout().lock()))?,
    };

    let report = monitor.report(chrono::Utc::now());
    info!(
        commands = stats.commands,
        errors = stats.errors,
        security_score = report.security_score,
        "Security monitor finished"
    );

    Ok(())
}

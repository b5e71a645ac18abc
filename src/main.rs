// Project: ACL Manager
mod config;
mod control;
mod process;
mod toggle;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use control::ControlFile;
use log::{debug, info};
use process::{ProcessScanner, TargetProbe};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use toggle::Coordinator;

/// Suspends and resumes the Android compatibility layer through the privileged helper daemon.
#[derive(Parser)]
#[command(name = "acl-manager", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control file watched by the helper daemon
    #[arg(long, global = true)]
    control_file: Option<PathBuf>,

    /// Root of the process table
    #[arg(long, global = true)]
    proc_root: Option<PathBuf>,

    /// Settle interval after each command, in milliseconds
    #[arg(long, global = true)]
    settle_ms: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Debug)]
enum Command {
    /// Interactive terminal UI (default)
    Ui,
    /// Print whether the ACL is running; exits 1 when it is not
    Status,
    /// Ask the daemon to stop the ACL
    Stop,
    /// Ask the daemon to start the ACL
    Start,
    /// List the ACL processes found in the process table
    List,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(path) = &self.control_file {
            config.control_file = path.clone();
        }
        if let Some(root) = &self.proc_root {
            config.proc_root = root.clone();
        }
        if let Some(ms) = self.settle_ms {
            config.settle_interval_ms = ms;
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        Ok(config)
    }
}

fn init_logging(config: &Config, interactive: bool) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.parse_filters(&config.log_level),
    };

    // Keep log lines off the terminal UI
    if interactive {
        let target: Box<dyn io::Write + Send> = match &config.log_file {
            Some(path) => Box::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?,
            ),
            None => Box::new(io::sink()),
        };
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.config()?;
    let command = cli.command.unwrap_or(Command::Ui);

    init_logging(&config, command == Command::Ui)?;
    debug!("{:?}", config);

    let scanner = ProcessScanner::new(&config.proc_root);
    let mut coordinator = Coordinator::new(
        scanner,
        ControlFile::new(&config.control_file),
        config.settle_interval(),
    );

    match command {
        Command::Ui => ui::ui_renderer(coordinator)?,
        Command::Status => {
            let status = coordinator.detect();
            println!("{}", status.message);
            if !status.running {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Stop => println!("{}", coordinator.request_stop().message),
        Command::Start => println!("{}", coordinator.request_start().message),
        Command::List => {
            let records = coordinator.probe().scan();
            info!("{} ACL processes under {}", records.len(), coordinator.probe().root().display());
            println!("{:<8} {:<12} {}", "PID", "STATE", "COMMAND");
            for record in &records {
                println!("{:<8} {:<12} {}", record.pid, record.state_name(), record.command());
            }
            println!(
                "ACL {}",
                if coordinator.probe().any_target_running() { "running" } else { "not running" }
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

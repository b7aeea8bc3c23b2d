//! Service binary: load configuration, run until told to stop.

use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;

use pickcam_core::init_with_level;
use pickcam_service::{Service, ServiceConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "pickcam-service")]
#[command(about = "Camera sensing, calibration, and relay service for the block picking cell")]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Write the default configuration to the given path and exit.
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Override the capture ingest bind address (host:port).
    #[arg(long, value_name = "ADDR")]
    stream_addr: Option<String>,

    /// Override the command endpoint bind address (host:port).
    #[arg(long, value_name = "ADDR")]
    command_addr: Option<String>,

    /// Override the relay target address (host:port).
    #[arg(long, value_name = "ADDR")]
    relay_addr: Option<String>,

    /// Disable the frame relay regardless of configuration.
    #[arg(long)]
    no_relay: bool,
}

fn split_host_port(raw: &str) -> CliResult<(String, u16)> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("address '{raw}' is not host:port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("address '{raw}' has an invalid port"))?;
    Ok((host.to_string(), port))
}

fn load_config(cli: &Cli) -> CliResult<ServiceConfig> {
    let mut config = if cli.config.exists() {
        ServiceConfig::load_json(&cli.config)?
    } else {
        log::warn!(
            "configuration file {} not found, using defaults",
            cli.config.display()
        );
        ServiceConfig::default()
    };

    if let Some(addr) = &cli.stream_addr {
        (config.stream.host, config.stream.port) = split_host_port(addr)?;
    }
    if let Some(addr) = &cli.command_addr {
        (config.command.host, config.command.port) = split_host_port(addr)?;
    }
    if let Some(addr) = &cli.relay_addr {
        (config.relay.host, config.relay.port) = split_host_port(addr)?;
    }
    if cli.no_relay {
        config.relay.enabled = false;
    }
    Ok(config)
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_with_level(cli.log_level)?;

    if let Some(path) = &cli.write_default_config {
        ServiceConfig::default().write_json(path)?;
        println!("wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let service = Service::start(config)?;
    log::info!(
        "running; capture on {}, commands on {} (type 'quit' or close stdin to stop)",
        service.ingest_addr(),
        service.command_addr()
    );

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    service.shutdown();
    Ok(())
}

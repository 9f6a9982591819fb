use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tierlite::cli as prog_cli;
use tierlite::config::TierliteConfig;

#[derive(Parser, Debug)]
#[command(name = "tierlite", version, about = "tierlite cache tooling", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Falls back to TIERLITE_CONFIG, then ./tierlite.toml.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Remote store URL (redis://...). Overrides remote.url from the config.")]
    redis_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(name = "check-config", about = "Parse and validate a config file")]
    CheckConfig {
        #[arg(help = "Config file; defaults to the resolved config")]
        file: Option<PathBuf>,
    },
    #[command(name = "simulate-limit", about = "Run a burst of acquisitions against one key-class")]
    SimulateLimit {
        #[arg(long, default_value = "default")]
        key_class: String,
        #[arg(long, default_value_t = 100)]
        permits_per_second: u64,
        #[arg(long, default_value_t = 0)]
        burst: u64,
        #[arg(long, default_value_t = 200)]
        calls: u32,
        #[arg(long, default_value_t = 1, help = "Permits taken per call")]
        permits: u32,
    },
    #[command(name = "simulate-degrade", about = "Record outcomes and report the degrade decision")]
    SimulateDegrade {
        #[arg(long, default_value = "default")]
        key_class: String,
        #[arg(long, default_value_t = 20)]
        min_requests: u64,
        #[arg(long, default_value_t = 50.0)]
        threshold: f64,
        #[arg(long, default_value_t = 20)]
        requests: u64,
        #[arg(long, default_value_t = 10, help = "How many of the recorded requests failed")]
        failures: u64,
    },
}

fn init_logging(cfg: &TierliteConfig) {
    let log = &cfg.logging;
    let r = if log.dir.is_some() || log.level.is_some() || log.dev6 {
        tierlite::logger::configure_logging_with_dev(
            log.dir.as_deref(),
            log.level.as_deref(),
            log.retention,
            log.dev6,
        )
    } else {
        tierlite::logger::configure_from_env()
    };
    if let Err(e) = r {
        eprintln!("warning: logging not configured: {e}");
    }
}

fn main() {
    let cli = Cli::parse();
    let mut cfg = match TierliteConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(url) = cli.redis_url {
        cfg.remote.url = Some(url);
    }
    init_logging(&cfg);
    let store = match tierlite::remote::connect(&cfg.remote) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let cmd = match cli.command {
        Commands::CheckConfig { file } => prog_cli::Command::CheckConfig { path: file },
        Commands::SimulateLimit { key_class, permits_per_second, burst, calls, permits } => {
            prog_cli::Command::SimulateLimit { key_class, permits_per_second, burst, calls, permits }
        }
        Commands::SimulateDegrade { key_class, min_requests, threshold, requests, failures } => {
            prog_cli::Command::SimulateDegrade { key_class, min_requests, threshold, requests, failures }
        }
    };
    let mut stdout = std::io::stdout();
    if let Err(e) = prog_cli::run(&cfg, store, cmd, &mut stdout) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

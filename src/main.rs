use clap::Parser;
use log::{error, info, warn};
use marquee::LogLevel;
use marquee::core::config::{self, CliOverrides, ConfigError};
use marquee::core::coordinator::AppCoordinator;
use marquee::remote::SeerrClient;
use marquee::tui;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::OpenOptions;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "marquee", about = "Terminal client for Jellyseerr media requests")]
struct Args {
    /// Server base URL (overrides config and JELLYSEERR_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Log verbosity
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Log file path (temp dir, ~/.marquee or the working directory)
    #[arg(long)]
    log_file: Option<String>,

    /// Start without checking that the server is reachable
    #[arg(long)]
    skip_check: bool,
}

fn fail(message: impl std::fmt::Display) -> std::io::Error {
    eprintln!("marquee: {message}");
    std::io::Error::other(message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let file_config = match config::load_config() {
        Ok(c) => c,
        Err(e) => return Err(fail(e)),
    };
    let resolved = config::resolve(
        &file_config,
        &CliOverrides {
            base_url: args.base_url.clone(),
            log_level: args.log_level.map(|l| l.as_str().to_string()),
            log_file: args.log_file.clone(),
        },
    );

    // Initialize file logger - writes to the resolved (confined) log path
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&resolved.log_file)
    {
        Ok(log_file) => {
            let level = LogLevel::from_name(&resolved.log_level).filter();
            let _ = WriteLogger::init(level, log_config, log_file);
        }
        Err(e) => eprintln!(
            "marquee: cannot open log file {}: {e}",
            resolved.log_file.display()
        ),
    }

    info!("Marquee starting up against {}", resolved.base_url);

    if let Err(e) = resolved.validate() {
        error!("{}", e);
        if let ConfigError::Invalid(problems) = &e {
            for problem in problems {
                eprintln!("  - {problem}");
            }
        }
        return Err(fail(e));
    }

    let client = match SeerrClient::new(
        &resolved.base_url,
        resolved.api_key.clone(),
        resolved.request_timeout,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build client: {}", e);
            return Err(fail(e));
        }
    };

    let coordinator = AppCoordinator::new(
        tokio::runtime::Handle::current(),
        client,
        resolved.coordinator_settings(),
    );

    if args.skip_check {
        info!("Skipping server check");
    } else {
        match coordinator.check_server().await {
            Ok(Some(version)) => info!("Server reachable (version {})", version),
            Ok(None) => info!("Server reachable"),
            Err(kind) => {
                warn!("Server check failed: {}", kind);
                return Err(fail(format!(
                    "cannot reach {}: {} (use --skip-check to start anyway)",
                    resolved.base_url,
                    kind.user_message()
                )));
            }
        }
    }

    let result = tui::run(&coordinator, &resolved);
    info!("Marquee shutting down");
    result
}

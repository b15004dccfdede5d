//! Main entry point for the duet-room relay
//!
//! Initializes logging and configuration, starts the HTTP/WebSocket server
//! and shuts down gracefully on SIGINT / SIGTERM.

use anyhow::Result;
use clap::Parser;
use duet_room::config::AppConfig;
use duet_room::service::{AppState, HealthCheck};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Duet Room - two-seat realtime room relay
#[derive(Parser)]
#[command(
    name = "duet-room",
    version,
    about = "A realtime relay for two-seat rooms with chat and avatar updates",
    long_about = "Duet Room hosts bounded two-seat rooms that clients create over HTTP and join \
                 over a WebSocket, by id or invite code. Chat messages and side-keyed avatar \
                 updates are fanned out to room members; empty rooms are removed automatically."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Probe a running instance and exit
    #[arg(long, help = "Query /health of a running instance and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Public base URL override
    #[arg(long, value_name = "URL", help = "Override the base URL used in invite links")]
    public_base_url: Option<String>,

    /// Avatar service override
    #[arg(long, value_name = "URL", help = "Override the avatar service endpoint")]
    avatar_url: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Query the health endpoint of a running instance
async fn perform_health_check(config: &AppConfig) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/health", config.service.http_port);
    info!("Performing health check against {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    match client.get(&url).send().await {
        Ok(response) => {
            let healthy = response.status().is_success();
            let body = response.text().await.unwrap_or_default();
            println!("{}", body);
            std::process::exit(if healthy { 0 } else { 1 });
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Log a health summary every 30 seconds
async fn health_check_task(app_state: &AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    let manager = app_state.manager();
    let hub = app_state.hub();
    let service_name = app_state.config().service.name.clone();

    loop {
        interval.tick().await;
        let running = app_state.is_running().await;

        match HealthCheck::check(&manager, &hub, &service_name, running).await {
            Ok(health) => {
                info!(
                    "Health check: {} - {} rooms, {} participants, {} connections",
                    health.status,
                    health.stats.active_rooms,
                    health.stats.active_participants,
                    health.stats.connected_clients
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Duet Room Relay");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Listening on: {}", config.http_addr());
    info!("   Invite links: {}/invite/<code>", config.service.public_base_url);
    info!(
        "   Avatar service: {}",
        config
            .avatar
            .service_url
            .as_deref()
            .unwrap_or("placeholder")
    );
    info!("   Outbound queue: {} events", config.service.outbound_queue_size);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    if let Some(base_url) = &args.public_base_url {
        config.service.public_base_url = base_url.clone();
    }

    if let Some(avatar_url) = &args.avatar_url {
        config.avatar.service_url = Some(avatar_url.clone());
    }

    duet_room::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(&config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Duet Room relay is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        _ = health_check_task(&app_state) => {}
    }

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => {
            info!("✅ Graceful shutdown completed successfully");
        }
        Ok(Err(e)) => {
            error!("Shutdown failed: {}", e);
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("🛑 Duet Room relay stopped");
    Ok(())
}

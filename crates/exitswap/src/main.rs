//! # exitswap - Tor exit identity rotator
//!
//! ## Usage
//! ```bash
//! # Rotate three times, never reusing an exit
//! PASSWORD=... SERVICE_URL=https://api.ipify.org exitswap rotate --count 3 --unique
//!
//! # Admin API with a rotation every five minutes
//! exitswap serve --auto-rotate-secs 300
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use exitswap::config::{AppConfig, Overrides};
use exitswap::{AppState, routes, state, worker};
use exitswap_common::RotationPolicy;

/// exitswap - Tor exit identity rotator
#[derive(Parser, Debug)]
#[command(name = "exitswap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/exitswap.toml")]
    config: String,

    /// Tor control port
    #[arg(long, env = "PORT")]
    control_port: Option<u16>,

    /// Tor control password
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// URL that answers with the caller's IP address
    #[arg(long, env = "SERVICE_URL")]
    service_url: Option<String>,

    /// SOCKS proxy for requests through Tor
    #[arg(long, env = "SOCKET")]
    socks_url: Option<String>,

    /// MaxCircuitDirtiness hint (seconds)
    #[arg(long, env = "MAX_CIRCUIT_DIRTINESS")]
    max_circuit_dirtiness: Option<u64>,

    /// Renewal attempts per rotation
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rotate the exit identity and report what an external server sees
    Rotate {
        /// Number of rotations
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Require a never-seen exit address
        #[arg(long)]
        unique: bool,

        /// Accept an exit equal to the local address
        #[arg(long)]
        allow_local_match: bool,
    },

    /// Run the admin HTTP API
    Serve {
        /// Listen address (overrides config)
        #[arg(short, long, env = "LISTEN_ADDR")]
        listen: Option<String>,

        /// Rotate in the background every N seconds (overrides config, 0 disables)
        #[arg(long)]
        auto_rotate_secs: Option<u64>,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        let listen_addr = match &self.command {
            Command::Serve { listen, .. } => listen.clone(),
            Command::Rotate { .. } => None,
        };

        Overrides {
            control_port: self.control_port,
            control_password: self.password.clone(),
            service_url: self.service_url.clone(),
            socks_url: self.socks_url.clone(),
            max_circuit_dirtiness: self.max_circuit_dirtiness,
            max_attempts: self.max_attempts,
            listen_addr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up PORT/PASSWORD/SERVICE_URL/SOCKET from .env before clap reads them
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting exitswap v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(&args.config, &args.overrides())?;

    match args.command {
        Command::Rotate {
            count,
            unique,
            allow_local_match,
        } => {
            let policy = RotationPolicy::default()
                .with_unique(unique)
                .with_prevent_baseline_match(!allow_local_match);
            run_rotations(&config, count, policy).await
        }
        Command::Serve {
            auto_rotate_secs, ..
        } => {
            if let Some(secs) = auto_rotate_secs {
                config.rotation.auto_rotate_secs = secs;
            }
            serve(config).await
        }
    }
}

/// Rotate `count` times, logging local, rotated, and externally seen addresses
async fn run_rotations(config: &AppConfig, count: usize, policy: RotationPolicy) -> Result<()> {
    let mut rotator = state::build_rotator(config).await?;
    let probe_target = rotator.config().probe_target.clone();

    for round in 1..=count {
        let rotated = rotator.rotate(policy).await?;
        let seen = rotator
            .make_anonymized_request(&probe_target)
            .await
            .context("Failed to confirm exit address")?;

        info!(
            round,
            local = %rotator.baseline_address(),
            rotated = %rotated,
            seen = %seen.trim(),
            "Rotation complete"
        );
    }

    info!(diagnostics = %rotator.diagnostics_dump()?, "Last renewal diagnostics");
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let state = AppState::connect(&config).await?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    if config.rotation.auto_rotate_secs > 0 {
        let policy = RotationPolicy::default()
            .with_unique(config.rotation.unique)
            .with_prevent_baseline_match(config.rotation.prevent_local_match);
        tokio::spawn(worker::rotation_worker(
            state.clone(),
            Duration::from_secs(config.rotation.auto_rotate_secs),
            policy,
            shutdown_tx.subscribe(),
        ));
    }

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("exitswap admin API listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("exitswap shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}

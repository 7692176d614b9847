use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hostbridge::managers::LogListener;
use hostbridge::{BridgeConfig, BridgeHandle, CommandTable};

#[derive(Parser, Debug)]
#[command(
    name = "hostbridge",
    about = "HTTP control bridge for a plugin-host engine"
)]
struct Cli {
    /// Log level: error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the control HTTP server against the in-memory engine
    Serve {
        /// JSON config file; missing or invalid files fall back to defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides config and environment
        #[arg(long)]
        addr: Option<SocketAddr>,
        /// Access token required on every request
        #[arg(long)]
        token: Option<String>,
        /// Idle pump period in milliseconds
        #[arg(long)]
        idle_ms: Option<u64>,
        /// Write every notification to the log
        #[arg(long)]
        echo_notifications: bool,
    },
    /// List supported operations and their parameters
    Operations,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    hostbridge::init_logging(&cli.log_level);

    match cli.command {
        Commands::Serve {
            config,
            addr,
            token,
            idle_ms,
            echo_notifications,
        } => {
            let mut config = config
                .map(BridgeConfig::load_from_file)
                .unwrap_or_default()
                .with_env_overrides();
            if let Some(addr) = addr {
                config.http.addr = addr;
            }
            if token.is_some() {
                config.http.token = token;
            }
            if let Some(idle_ms) = idle_ms {
                config.idle.interval_ms = idle_ms;
            }
            run_serve(config, echo_notifications)
        }
        Commands::Operations => run_operations(),
    }
}

fn run_serve(config: BridgeConfig, echo_notifications: bool) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let addr = config.http.addr;
        let token = config.http.token.clone();
        let (bridge, _engine) = BridgeHandle::with_stub_engine(config);
        let bridge = Arc::new(bridge);

        if echo_notifications {
            bridge
                .notifications()
                .register_listener(Arc::new(LogListener));
        }
        let pump = bridge.spawn_idle_pump();

        let shutdown = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("[Serve] failed to listen for ctrl-c: {}", err);
                std::future::pending::<()>().await;
            }
            log::info!("[Serve] shutdown requested");
        };
        let served = hostbridge::http::serve(Arc::clone(&bridge), addr, token, shutdown).await;

        pump.abort();
        bridge.shutdown();
        served
    })?;

    Ok(ExitCode::SUCCESS)
}

fn run_operations() -> Result<ExitCode> {
    for command in CommandTable::global().descriptors() {
        println!("{:<32} {:<48} {}", command.name, command.params.join(","), command.summary);
    }
    Ok(ExitCode::SUCCESS)
}

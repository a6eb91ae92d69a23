//! Buggy daemon
//!
//! Runs the autonomous update loop and a line-oriented TCP command server
//! side by side over one shared robot. Ctrl+C stops the loop, halts the
//! motors and turns the lights off before exiting.

use anyhow::{Context, Result};
use buggyd::{
    run_update_loop, Clock, CommandServer, DaemonConfig, MonitorOutput, Robot, SimBuggy,
    TokioClock,
};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/default_config.yaml";

#[derive(Parser)]
#[command(name = "buggyd")]
#[command(about = "Buggy daemon - autonomous modes with a TCP command interface")]
#[command(version)]
struct Args {
    /// Path to the daemon configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("DEFAULT_CONFIG_PATH").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
    }

    fn load_config(&self) -> Result<DaemonConfig> {
        let config_path = self.get_config_path();
        let explicit = self.config.is_some() || std::env::var("DEFAULT_CONFIG_PATH").is_ok();

        let mut config = if explicit || Path::new(&config_path).exists() {
            info!("Using config: {}", config_path);
            DaemonConfig::load_from_path(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?
        } else {
            warn!("{} not found, using built-in defaults", config_path);
            DaemonConfig::default()
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Buggy daemon");
    info!("{}", "=".repeat(50));
    let config = args.load_config()?;

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let tick = Duration::from_millis(config.robot.tick_interval_ms);
    let monitor = config
        .publishing
        .enabled
        .then(|| MonitorOutput::new(config.publishing.decimal_places));
    let (host, port, prompt) = (
        config.server.host.clone(),
        config.server.port,
        config.server.prompt.clone(),
    );

    info!("Driving the simulated buggy");
    let robot = Robot::new(Box::new(SimBuggy::new()), clock.clone(), config).into_shared();
    let shutdown_signal = Arc::new(AtomicBool::new(false));

    let update_handle = tokio::spawn(run_update_loop(
        robot.clone(),
        tick,
        shutdown_signal.clone(),
        monitor,
    ));

    let server = CommandServer::bind(&host, port, robot.clone(), clock, prompt)
        .await
        .with_context(|| format!("Failed to listen on {}:{}", host, port))?;

    let outcome = tokio::select! {
        result = server.serve() => result.context("Command server failed"),
        signal = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
            signal.context("Failed to listen for Ctrl+C")
        }
    };
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    // Stop ticking before parking so no tick restarts the motors
    shutdown_signal.store(true, Ordering::Relaxed);
    if let Err(e) = update_handle.await {
        warn!("Update loop task failed: {}", e);
    }

    info!("Performing graceful shutdown");
    {
        let mut robot = robot.lock().await;
        robot.halt();
        robot.lights_off();
    }
    info!("Shutdown complete");
    outcome
}

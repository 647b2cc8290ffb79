//! `hearthd` – the Hearth home automation bridge.
//!
//! 1. Loads `~/.hearth/config.toml` (defaults when absent) and applies
//!    environment overrides.
//! 2. Connects to the MQTT broker, or runs on an in-process bus when MQTT is
//!    disabled.
//! 3. Starts the inbound/outbound pumps, the optional sensor simulator and
//!    the HTTP + WebSocket API.
//! 4. Shuts everything down on Ctrl-C.

mod config;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use hearth_cockpit::ApiServer;
use hearth_hal::SensorSimulator;
use hearth_kernel::{BridgeCore, run_inbound, run_outbound, subscribe_inbound};
use hearth_middleware::{BusAdapter, MemoryBus, MqttBus, MqttSettings};
use hearth_types::{DeviceState, HearthError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("hearthd");

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "hearthd stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<(), HearthError> {
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    let (core, commands) = BridgeCore::new(
        DeviceState::default(),
        &cfg.topic_prefix,
        cfg.viewer_queue_capacity,
    );

    // ── Bus ───────────────────────────────────────────────────────────────
    let bus: Arc<dyn BusAdapter> = if cfg.mqtt_enabled {
        let (bus, driver) =
            MqttBus::connect(&MqttSettings::new(&cfg.mqtt_url, &cfg.mqtt_client_id))?;
        tasks.spawn(driver.run(cancel.clone()));
        info!(url = %cfg.mqtt_url, "MQTT bridge enabled");
        Arc::new(bus)
    } else {
        warn!("MQTT disabled; commands stay on the in-process bus");
        Arc::new(MemoryBus::default())
    };

    let inbound = subscribe_inbound(&core, bus.as_ref()).await?;
    tasks.spawn(run_inbound(Arc::clone(&core), inbound, cancel.clone()));
    tasks.spawn(run_outbound(commands, Arc::clone(&bus), cancel.clone()));

    // ── Simulator ─────────────────────────────────────────────────────────
    if cfg.simulate_sensors {
        let simulator = SensorSimulator::new(&core.snapshot());
        info!(period_secs = cfg.sim_interval().as_secs(), "sensor simulation enabled");
        tasks.spawn(simulator.run(Arc::clone(&core), cfg.sim_interval(), cancel.clone()));
    }

    // ── API ───────────────────────────────────────────────────────────────
    let server = ApiServer::new(Arc::clone(&core)).with_port(cfg.http_port);
    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            cancel.cancel();
            tasks.join_all().await;
            return Err(e);
        }
    };
    let mut server_task = tokio::spawn(server.serve(listener, cancel.clone()));

    println!(
        "  API ready on {}",
        format!("http://localhost:{}", cfg.http_port).bold().cyan()
    );

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
            println!();
            println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            None
        }
        finished = &mut server_task => Some(finished),
    };
    cancel.cancel();
    let joined = match finished {
        Some(joined) => joined,
        None => server_task.await,
    };

    tasks.join_all().await;
    println!("{}", "  ✓ Hearth stopped.".green());
    joined.map_err(|e| HearthError::Io(format!("API task failed: {e}")))?
}

fn print_banner() {
    println!();
    println!("{}", r"  _                      _   _     ".bold().yellow());
    println!("{}", r" | |__   ___  __ _ _ __| |_| |__  ".bold().yellow());
    println!("{}", r" | '_ \ / _ \/ _` | '__| __| '_ \ ".bold().yellow());
    println!("{}", r" | | | |  __/ (_| | |  | |_| | | |".bold().yellow());
    println!("{}", r" |_| |_|\___|\__,_|_|   \__|_| |_|".bold().yellow());
    println!();
    println!(
        "  {} {}",
        "Hearth home automation bridge".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!();
}

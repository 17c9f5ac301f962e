//! Gati - legged robot control daemon
//!
//! ## Ports
//!
//! - **TCP (5555)**: length-prefixed JSON commands, one ack per command
//! - **UDP (5556)**: status snapshots and events, fire-and-forget
//!
//! Without a configured `streaming.status_target`, status goes to the
//! connected command client.

use gati::config::GatiConfig;
use gati::devices::create_context;
use gati::error::{Error, Result};
use gati::orchestrator::ControlLoop;
use gati::routines::RoutineLibrary;
use gati::streaming::{ClientRegistry, CommandListener, StatusPublisher};
use parking_lot::Mutex;
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Client-side status port when no fixed target is configured
const CLIENT_STATUS_PORT: u16 = 5556;

/// Parse config path from command line arguments.
///
/// Supports `gati <path>`, `gati --config <path>` and `gati -c <path>`.
/// Defaults to `gati.toml`.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "gati.toml".to_string()
}

fn load_config(path: &str) -> Result<GatiConfig> {
    if Path::new(path).exists() {
        GatiConfig::load(Path::new(path))
    } else {
        let config = GatiConfig::default();
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = load_config(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("Gati v{} starting...", env!("CARGO_PKG_VERSION"));
    if Path::new(&config_path).exists() {
        log::info!("Using config: {}", config_path);
    } else {
        log::warn!("Config {} not found, using defaults", config_path);
    }

    let routines = RoutineLibrary::from_config(config.control.routines_file.as_deref())?;
    let (context, _sim) = create_context(&config);

    let streaming = config.streaming.clone();
    let mut control = ControlLoop::new(config, routines, context)?;
    if let Err(e) = control.start() {
        // Fail-safe idle: neutral pose held, no threads running
        log::error!("Startup failed: {}", e);
        control.stop()?;
        return Err(e);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let clients: ClientRegistry = Arc::new(Mutex::new(None));
    let (target, status_port) = match &streaming.status_target {
        Some(t) => {
            let addr = StatusPublisher::resolve_target(t)?;
            (Some(addr), addr.port())
        }
        None => (None, CLIENT_STATUS_PORT),
    };

    let mut threads = Vec::new();

    if let Some(messages) = control.take_status_receiver() {
        let mut publisher =
            StatusPublisher::new(messages, target, Arc::clone(&clients), Arc::clone(&running))?;
        threads.push(
            thread::Builder::new()
                .name("status-publisher".to_string())
                .spawn(move || {
                    if let Err(e) = publisher.run() {
                        log::error!("Status publisher error: {}", e);
                    }
                })?,
        );
    }

    let listener = CommandListener::bind(
        &streaming.command_bind,
        control.command_handle(),
        Arc::clone(&running),
        Arc::clone(&clients),
        status_port,
        streaming.max_frame_bytes,
    )?;
    let command_addr: SocketAddr = listener.local_addr()?;
    threads.push(
        thread::Builder::new()
            .name("cmd-listener".to_string())
            .spawn(move || {
                if let Err(e) = listener.run() {
                    log::error!("Command listener error: {}", e);
                }
            })?,
    );

    log::info!("Gati running, commands on {}. Press Ctrl-C to stop.", command_addr);
    while running.load(Ordering::Relaxed) {
        thread::sleep(std::time::Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    control.stop()?;
    for handle in threads {
        if handle.join().is_err() {
            log::error!("Service thread panicked");
        }
    }

    log::info!("Gati stopped");
    Ok(())
}

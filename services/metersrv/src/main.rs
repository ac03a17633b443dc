//! Meter Service (metersrv)
//!
//! Opens the configured serial instrument and logs its readings until
//! SIGINT/SIGTERM.

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::service_bootstrap::{self, ServiceInfo};
use metersrv::{
    bootstrap::{self, Args, PowerSwitch},
    transport::SerialTransport,
    Device, DeviceEvent,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging settings live in the config file, so it is loaded first
    let manager = bootstrap::load_config(&args)?;
    let config = manager.config().clone();

    let service_info = ServiceInfo::new(
        "metersrv",
        env!("CARGO_PKG_VERSION"),
        "Serial multimeter and power-supply link service",
    );
    bootstrap::initialize_logging(&args, &service_info, &config.logging)?;
    if !args.no_color {
        service_bootstrap::print_startup_banner(&service_info);
    }

    if let Some(path) = &args.save_config {
        manager.save(path)?;
        return Ok(());
    }

    config.validate()?;
    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    info!(
        "Device '{}': {} on {}",
        config.device.name, config.device.kind, config.device.port
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let device = Device::new(config.device.clone(), SerialTransport::new(), events_tx);
    let (handle, task) = device.spawn();

    handle.start().await?;
    match args.power {
        Some(PowerSwitch::On) => handle.on().await?,
        Some(PowerSwitch::Off) => handle.off().await?,
        None => {},
    }

    let shutdown = common::shutdown::wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            event = events_rx.recv() => match event {
                Some(DeviceEvent::Measurement(m)) => {
                    info!("[{}] {} {}", config.device.name, m.reading, m.unit);
                }
                Some(DeviceEvent::Status(status)) => {
                    info!("[{}] Status: {}", config.device.name, status);
                }
                None => {
                    warn!("Device loop exited unexpectedly");
                    break;
                }
            },
        }
    }

    // The loop may already be gone; the join below reports its final state
    let _ = handle.shutdown().await;
    let snapshot = task.await?;
    info!("Transport: {}", snapshot.transport);
    info!(
        "Watchdog: ticks={} expiries={} reconnects={} failed={}",
        snapshot.watchdog.ticks,
        snapshot.watchdog.expiries,
        snapshot.watchdog.reconnects,
        snapshot.watchdog.failed_reconnects
    );

    Ok(())
}

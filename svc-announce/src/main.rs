mod advertise;
mod config;

use std::future::Future;
use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use crate::config::AnnounceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("svc_announce=info"))
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("svc-announce");
    let Some(name) = args.get(1) else {
        eprintln!("{}", config::usage(prog));
        std::process::exit(2);
    };

    let config = AnnounceConfig::from_args(name, &args[2..])
        .context("Invalid configuration")?;

    let daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;

    let service_info = match advertise::register_service(&daemon, &config) {
        Ok(info) => info,
        Err(e) => {
            withdraw(&daemon, None);
            return Err(e);
        }
    };

    // Announce until interrupted
    wait_for_interrupt(tokio::signal::ctrl_c()).await;

    withdraw(&daemon, Some(&service_info));
    tracing::info!("Cleanup done");
    Ok(())
}

/// Resolve once the signal fires or can no longer be listened for; either
/// way the caller goes on to clean up.
async fn wait_for_interrupt(signal: impl Future<Output = std::io::Result<()>>) -> bool {
    match signal.await {
        Ok(()) => {
            tracing::info!("Interrupt received, cleanup started");
            true
        }
        Err(e) => {
            tracing::error!("Failed to listen for ctrl-c: {}; cleaning up", e);
            false
        }
    }
}

/// Unregister the announced instance, if any, then stop the daemon.
/// Failures are logged so the remaining steps still run.
fn withdraw(daemon: &ServiceDaemon, service_info: Option<&ServiceInfo>) {
    if let Some(info) = service_info {
        match daemon.unregister(info.get_fullname()) {
            Ok(_) => tracing::info!("Unregistered {}", info.get_fullname()),
            Err(e) => tracing::error!("Failed to unregister {}: {}", info.get_fullname(), e),
        }
    }

    if let Err(e) = daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }
}

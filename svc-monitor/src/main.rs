mod config;
mod error;
mod heartbeat;
mod mdns;
mod registry;
mod report;

use std::sync::Arc;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::mdns::browser::MdnsEngine;
use crate::registry::ServiceRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics on stderr; stdout carries the reports
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("svc_monitor=info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("svc-monitor");
    let Some(service_type) = args.get(1) else {
        eprintln!("{}", config::usage(prog));
        std::process::exit(2);
    };

    let config = Config::from_args(service_type, &args[2..])
        .context("Invalid configuration")?;
    tracing::info!(
        "Monitoring {} (heartbeat {:?}, format {:?})",
        config.service_type,
        config.heartbeat,
        config.format
    );

    let engine = MdnsEngine::new(config.interface.as_deref())
        .context("Discovery engine unavailable")?;

    let registry = Arc::new(ServiceRegistry::new(config.service_type.clone()));
    engine
        .subscribe(&registry)
        .with_context(|| format!("Failed to subscribe to {}", config.service_type))?;

    // Consumer loop blocks on the registry, so keep it off the async workers
    let loop_registry = registry.clone();
    let (interval, format) = (config.heartbeat, config.format);
    let mut consumer = tokio::task::spawn_blocking(move || {
        heartbeat::run(&loop_registry, interval, format, std::io::stdout().lock())
    });

    let outcome = tokio::select! {
        joined = &mut consumer => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Interrupt received"),
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
            registry.close();
            consumer.await
        }
    };

    // Every exit path releases the subscription
    registry.close();

    outcome.context("Heartbeat loop panicked")??;
    tracing::info!("Shutdown complete");
    Ok(())
}

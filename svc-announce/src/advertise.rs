use mdns_sd::{ServiceDaemon, ServiceInfo};
use anyhow::{Context, Result};
use shared::protocol::LOCAL_DOMAIN;
use crate::config::AnnounceConfig;

/// Machine hostname qualified for mDNS, e.g. "box" -> "box.local."
fn local_hostname() -> Result<String> {
    let hostname = hostname::get()
        .context("Failed to get system hostname")?
        .to_string_lossy()
        .to_string();

    let bare = hostname.trim_end_matches('.');
    if bare.ends_with(".local") {
        Ok(format!("{}.", bare))
    } else {
        Ok(format!("{}.{}", bare, LOCAL_DOMAIN))
    }
}

pub fn register_service(daemon: &ServiceDaemon, config: &AnnounceConfig) -> Result<ServiceInfo> {
    let hostname = local_hostname()?;

    let service_info = match config.address {
        Some(address) => ServiceInfo::new(
            &config.service_type,
            &config.name,
            &hostname,
            address.to_string().as_str(),
            config.port,
            config.txt.clone(),
        ),
        None => ServiceInfo::new(
            &config.service_type,
            &config.name,
            &hostname,
            (),
            config.port,
            config.txt.clone(),
        )
        .map(ServiceInfo::enable_addr_auto),
    }
    .context("Failed to create ServiceInfo")?;

    daemon
        .register(service_info.clone())
        .context("Failed to register mDNS service")?;

    tracing::info!(
        "Registered {} as {} on port {}",
        config.service_type,
        service_info.get_fullname(),
        config.port
    );

    Ok(service_info)
}

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use shared::types::ServiceRecord;
use crate::error::DiscoveryError;
use crate::registry::{ServiceHandler, ServiceRegistry, Subscription};

/// Discovery engine backed by an in-process mdns-sd daemon.
pub struct MdnsEngine {
    daemon: ServiceDaemon,
}

impl MdnsEngine {
    /// Start the mDNS daemon, optionally restricted to one interface.
    pub fn new(interface: Option<&str>) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(DiscoveryError::EngineUnavailable)?;

        if let Some(interface) = interface {
            let restrict = || -> mdns_sd::Result<()> {
                daemon.disable_interface(IfKind::All)?;
                daemon.enable_interface(interface)
            };
            if let Err(source) = restrict() {
                // Daemon thread is already running; don't leak it
                shutdown_daemon(&daemon);
                return Err(DiscoveryError::InterfaceUnavailable {
                    interface: interface.to_string(),
                    source,
                });
            }
            tracing::info!("mDNS restricted to interface {}", interface);
        }

        Ok(Self { daemon })
    }

    /// Browse the registry's service type and feed events into it.
    ///
    /// Must be called from within a tokio runtime. The engine is handed to
    /// the registry, which releases it on `close()`.
    pub fn subscribe(self, registry: &Arc<ServiceRegistry>) -> Result<(), DiscoveryError> {
        let service_type = registry.service_type().to_string();
        let receiver = match self.daemon.browse(&service_type) {
            Ok(receiver) => receiver,
            Err(source) => {
                shutdown_daemon(&self.daemon);
                return Err(DiscoveryError::BrowseFailed { service_type, source });
            }
        };

        let cancel = CancellationToken::new();
        let handler: Weak<dyn ServiceHandler> = Arc::downgrade(registry) as Weak<dyn ServiceHandler>;
        tokio::spawn(run_browser(receiver, handler, cancel.clone()));

        tracing::info!("Browsing for {}", service_type);
        registry.attach(Box::new(MdnsSubscription {
            daemon: self.daemon,
            service_type,
            cancel,
        }));
        Ok(())
    }
}

struct MdnsSubscription {
    daemon: ServiceDaemon,
    service_type: String,
    cancel: CancellationToken,
}

impl Subscription for MdnsSubscription {
    fn close(&mut self) {
        self.cancel.cancel();

        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            tracing::error!("Failed to stop browsing {}: {}", self.service_type, e);
        }
        shutdown_daemon(&self.daemon);
        tracing::info!("Stopped browsing {}", self.service_type);
    }
}

fn shutdown_daemon(daemon: &ServiceDaemon) {
    log_shutdown(daemon.shutdown());
}

/// Returns whether the daemon accepted the shutdown request.
fn log_shutdown<T>(result: mdns_sd::Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to shutdown mDNS daemon: {}", e);
            false
        }
    }
}

/// Pump daemon events into the handler until cancelled, disconnected, or
/// the handler is gone.
async fn run_browser(
    receiver: flume::Receiver<ServiceEvent>,
    handler: Weak<dyn ServiceHandler>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!("mDNS receiver disconnected: {}", e);
                        break;
                    }
                };
                let Some(handler) = handler.upgrade() else {
                    break;
                };
                dispatch(handler.as_ref(), event);
            }

            _ = cancel.cancelled() => {
                tracing::debug!("mDNS browser shutting down");
                break;
            }
        }
    }
}

fn dispatch(handler: &dyn ServiceHandler, event: ServiceEvent) {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            handler.on_added(convert_service_info(&info));
        }
        ServiceEvent::ServiceRemoved(service_type, fullname) => {
            handler.on_removed(&service_type, &fullname);
        }
        ServiceEvent::ServiceFound(_, fullname) => {
            // Not resolved yet; a ServiceResolved follows
            tracing::debug!("Found {}", fullname);
        }
        other => {
            tracing::debug!("Ignoring mDNS event {:?}", other);
        }
    }
}

/// Convert a resolved mdns-sd ServiceInfo to a ServiceRecord
fn convert_service_info(info: &ServiceInfo) -> ServiceRecord {
    // The daemon keeps addresses in a set; sort for stable output
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    let attributes: HashMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    ServiceRecord {
        name: info.get_fullname().to_string(),
        addresses,
        port: info.get_port(),
        host: info.get_hostname().to_string(),
        attributes,
    }
}

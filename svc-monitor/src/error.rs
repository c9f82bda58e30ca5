use thiserror::Error;

/// Failures of the discovery engine. All of them happen while setting up;
/// once subscribed, the registry has no failure path.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// mDNS daemon could not be created
    #[error("Failed to initialize mDNS daemon: {0}")]
    EngineUnavailable(#[source] mdns_sd::Error),

    /// Requested interface could not be selected
    #[error("Failed to use interface '{interface}': {source}")]
    InterfaceUnavailable {
        interface: String,
        #[source]
        source: mdns_sd::Error,
    },

    /// Browsing for the service type was refused
    #[error("Failed to browse for service type '{service_type}': {source}")]
    BrowseFailed {
        service_type: String,
        #[source]
        source: mdns_sd::Error,
    },
}

use std::collections::HashMap;
use std::net::IpAddr;
use serde::{Serialize, Deserialize};

/// A resolved service instance on the network.
/// Records are only built once resolution has produced every field, and are
/// never modified after being handed to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Full DNS-SD instance name, e.g. "printer._http._tcp.local."
    pub name: String,

    /// Addresses in the order the resolver reported them
    pub addresses: Vec<IpAddr>,

    /// Service port
    pub port: u16,

    /// Target hostname, e.g. "printer.local."
    pub host: String,

    /// TXT record key-value pairs
    #[serde(rename = "TXT")]
    pub attributes: HashMap<String, String>,
}

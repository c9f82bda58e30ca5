use std::collections::HashMap;
use std::net::IpAddr;
use anyhow::{Context, Result};
use shared::protocol::{qualify_service_type, DEFAULT_ANNOUNCE_PORT, DEFAULT_ANNOUNCE_TYPE};

const KNOWN_KEYS: &[&str] = &["svc_type", "svc_port", "svc_txt", "svc_addr"];

#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceConfig {
    pub name: String,
    /// Fully qualified, e.g. "_http._tcp.local."
    pub service_type: String,
    pub port: u16,
    pub txt: HashMap<String, String>,
    /// None means detect interface addresses automatically
    pub address: Option<IpAddr>,
}

impl AnnounceConfig {
    pub fn from_args(name: &str, args: &[String]) -> Result<Self> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        for arg in args {
            match arg.split_once('=') {
                Some((key, value)) if KNOWN_KEYS.contains(&key) => {
                    params.insert(key, value);
                }
                _ => tracing::debug!("Ignoring argument: {}", arg),
            }
        }

        let port = match params.get("svc_port") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("Bad svc_port {}", port))?,
            None => DEFAULT_ANNOUNCE_PORT,
        };

        // svc_txt=key=value; a bare key carries an empty value
        let txt = params
            .get("svc_txt")
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => HashMap::from([(k.to_string(), v.to_string())]),
                None => HashMap::from([(entry.to_string(), String::new())]),
            })
            .unwrap_or_default();

        let address = params
            .get("svc_addr")
            .map(|addr| addr.parse::<IpAddr>().with_context(|| format!("Bad svc_addr {}", addr)))
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            service_type: qualify_service_type(params.get("svc_type").copied().unwrap_or(DEFAULT_ANNOUNCE_TYPE)),
            port,
            txt,
            address,
        })
    }
}

pub fn usage(prog: &str) -> String {
    format!(
        "\nUsage:\n\n{prog} svc_name [svc_type=x] [svc_port=x] [svc_txt=x] [svc_addr=x]\n\n\
         Default values for optional parameters:\n\n\
         svc_type : {DEFAULT_ANNOUNCE_TYPE}\n\
         svc_port : {DEFAULT_ANNOUNCE_PORT}\n\
         svc_txt : (none)\n\
         svc_addr : (auto)\n"
    )
}

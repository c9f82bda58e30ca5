use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{qualify_service_type, DEFAULT_HEARTBEAT_SECS};
use crate::report::ReportFormat;

const KEY_HEARTBEAT: &str = "heartbeat";
const KEY_FORMAT: &str = "format";
const KEY_INTERFACE: &str = "interface";
const KEY_CONFIG: &str = "config";

/// Optional `key=value` arguments, in the order they are documented
const KNOWN_KEYS: &[&str] = &[KEY_HEARTBEAT, KEY_FORMAT, KEY_INTERFACE, KEY_CONFIG];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Fully qualified service type, e.g. "_http._tcp.local."
    pub service_type: String,
    pub heartbeat: Duration,
    pub format: ReportFormat,
    pub interface: Option<String>,
}

/// On-disk form, e.g.
///
/// ```toml
/// [monitor]
/// heartbeat = 1.5
/// format = "json"
/// interface = "eth0"
/// ```
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    monitor: MonitorSection,
}

#[derive(Debug, Default, Deserialize)]
struct MonitorSection {
    heartbeat: Option<toml::Value>,
    format: Option<String>,
    interface: Option<String>,
}

fn default_heartbeat() -> Duration {
    Duration::from_secs_f64(DEFAULT_HEARTBEAT_SECS)
}

impl Config {
    /// Build from the mandatory service type and any `key=value` overrides.
    /// Overrides win over values from a `config=path` file.
    pub fn from_args(service_type: &str, args: &[String]) -> Result<Self> {
        let params = collect_params(args);

        let mut config = Config {
            service_type: qualify_service_type(service_type),
            heartbeat: default_heartbeat(),
            format: ReportFormat::default(),
            interface: None,
        };

        if let Some(path) = params.get(KEY_CONFIG) {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            config
                .apply_file(&contents)
                .with_context(|| format!("Failed to parse config file: {}", Path::new(path).display()))?;
        }

        if let Some(value) = params.get(KEY_HEARTBEAT) {
            config.heartbeat = parse_heartbeat(value);
        }
        if let Some(value) = params.get(KEY_FORMAT) {
            config.format = parse_format(value);
        }
        if let Some(value) = params.get(KEY_INTERFACE) {
            config.interface = Some(value.clone());
        }

        Ok(config)
    }

    fn apply_file(&mut self, contents: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(contents)?;
        let section = file.monitor;

        if let Some(value) = section.heartbeat {
            let text = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            self.heartbeat = parse_heartbeat(&text);
        }
        if let Some(value) = section.format {
            self.format = parse_format(&value);
        }
        if section.interface.is_some() {
            self.interface = section.interface;
        }

        Ok(())
    }
}

/// Split `key=value` tokens, keeping only known keys. Later tokens win.
fn collect_params(args: &[String]) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            tracing::debug!("Ignoring argument without '=': {}", arg);
            continue;
        };
        if !KNOWN_KEYS.contains(&key) {
            tracing::debug!("Ignoring unknown parameter: {}", key);
            continue;
        }
        params.insert(key.to_string(), value.to_string());
    }
    params
}

/// Parse a heartbeat in seconds. Bad or non-positive values fall back to the
/// default with a warning; values too large for a Duration wait unbounded.
pub fn parse_heartbeat(value: &str) -> Duration {
    let secs = match value.trim().parse::<f64>() {
        Ok(secs) => secs,
        Err(_) => {
            tracing::warn!("Bad heartbeat {}; using {}s", value, DEFAULT_HEARTBEAT_SECS);
            return default_heartbeat();
        }
    };

    if secs.is_nan() || secs <= 0.0 {
        tracing::warn!("Bad heartbeat {}s; using {}s", value, DEFAULT_HEARTBEAT_SECS);
        return default_heartbeat();
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn parse_format(value: &str) -> ReportFormat {
    value.parse().unwrap_or_else(|e| {
        tracing::warn!("{}; using text", e);
        ReportFormat::Text
    })
}

/// Usage text printed when the service type is missing.
pub fn usage(prog: &str) -> String {
    let keys: Vec<String> = KNOWN_KEYS.iter().map(|k| format!("[{}=x]", k)).collect();
    format!(
        "\nUsage:\n\n{prog} svc_type {keys}\n\n\
         Example:\n\n{prog} _http._tcp heartbeat=1.5\n\n\
         Default values for optional parameters:\n\n\
         {KEY_HEARTBEAT} : {DEFAULT_HEARTBEAT_SECS}\n\
         {KEY_FORMAT} : text\n\
         {KEY_INTERFACE} : (all)\n\
         {KEY_CONFIG} : (none)\n",
        keys = keys.join(" "),
    )
}

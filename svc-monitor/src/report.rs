use std::io::Write;
use std::str::FromStr;
use anyhow::Result;
use serde::Serialize;
use shared::types::ServiceRecord;
use crate::registry::Snapshot;

/// How reports are written to the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

#[derive(Serialize)]
struct ServicesLine<'a> {
    revision: u64,
    services: Vec<&'a ServiceRecord>,
}

#[derive(Serialize)]
struct HeartbeatLine {
    revision: u64,
    heartbeat: bool,
}

/// Write the full service set.
pub fn write_services(out: &mut impl Write, format: ReportFormat, snapshot: &Snapshot) -> Result<()> {
    let services = snapshot.sorted();

    match format {
        ReportFormat::Text => {
            writeln!(out, "Services:")?;
            for svc in services {
                let addresses: Vec<String> = svc.addresses.iter().map(|a| a.to_string()).collect();
                let mut txt: Vec<(&String, &String)> = svc.attributes.iter().collect();
                txt.sort();
                let txt: Vec<String> = txt.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

                writeln!(out, "  {} :", svc.name)?;
                writeln!(out, "    name : {}", svc.name)?;
                writeln!(out, "    addresses : [{}]", addresses.join(", "))?;
                writeln!(out, "    port : {}", svc.port)?;
                writeln!(out, "    host : {}", svc.host)?;
                writeln!(out, "    TXT : {{{}}}", txt.join(", "))?;
            }
            writeln!(out)?;
        }
        ReportFormat::Json => {
            let line = ServicesLine {
                revision: snapshot.revision,
                services,
            };
            serde_json::to_writer(&mut *out, &line)?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Write a liveness line carrying the number of changes seen so far.
pub fn write_heartbeat(out: &mut impl Write, format: ReportFormat, revision: u64) -> Result<()> {
    match format {
        ReportFormat::Text => {
            writeln!(out, "Heartbeat ( {} service update messages )", revision)?;
        }
        ReportFormat::Json => {
            serde_json::to_writer(&mut *out, &HeartbeatLine { revision, heartbeat: true })?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}

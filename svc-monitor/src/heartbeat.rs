use std::io::Write;
use std::time::Duration;
use anyhow::Result;
use crate::registry::ServiceRegistry;
use crate::report::{self, ReportFormat};

/// Consumer loop: alternate between waiting on the registry and reporting.
///
/// A change prints the full service set; a quiet interval prints a
/// heartbeat. Returns once the registry is closed. The baseline is the
/// empty registry, so services resolved before the loop starts are reported
/// on the first pass.
pub fn run(
    registry: &ServiceRegistry,
    interval: Duration,
    format: ReportFormat,
    mut out: impl Write,
) -> Result<()> {
    let mut last_seen = 0;

    loop {
        let changed = registry.wait_for_change(last_seen, interval);
        if registry.is_closed() {
            tracing::debug!("Registry closed, leaving heartbeat loop");
            return Ok(());
        }

        if changed {
            let snapshot = registry.snapshot();
            last_seen = snapshot.revision;
            report::write_services(&mut out, format, &snapshot)?;
        } else {
            report::write_heartbeat(&mut out, format, registry.revision())?;
        }
    }
}

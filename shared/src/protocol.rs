/// Default heartbeat interval in seconds, used when none (or a bad one) is given
pub const DEFAULT_HEARTBEAT_SECS: f64 = 2.0;

/// Domain appended to bare service types, e.g. "_http._tcp" -> "_http._tcp.local."
pub const LOCAL_DOMAIN: &str = "local.";

/// Defaults for the announcing side
pub const DEFAULT_ANNOUNCE_TYPE: &str = "_http._tcp";
pub const DEFAULT_ANNOUNCE_PORT: u16 = 666;

/// Qualify a service type with the `.local.` domain unless it already carries it.
pub fn qualify_service_type(service_type: &str) -> String {
    let bare = service_type.trim().trim_end_matches('.');
    let domain = LOCAL_DOMAIN.trim_end_matches('.');

    if bare.ends_with(&format!(".{}", domain)) {
        format!("{}.", bare)
    } else {
        format!("{}.{}", bare, LOCAL_DOMAIN)
    }
}

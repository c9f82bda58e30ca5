use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use shared::protocol::DEFAULT_HEARTBEAT_SECS;
use shared::types::ServiceRecord;

/// Receives add/remove notifications from a discovery engine.
/// The engine only ever sees this trait, never the registry itself.
pub trait ServiceHandler: Send + Sync {
    fn on_added(&self, record: ServiceRecord);
    fn on_removed(&self, service_type: &str, name: &str);
}

/// A live discovery subscription, released when the registry closes.
pub trait Subscription: Send {
    fn close(&mut self);
}

/// Point-in-time copy of the registry contents.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub revision: u64,
    pub services: HashMap<String, Arc<ServiceRecord>>,
}

impl Snapshot {
    /// Records sorted by name, for stable display
    pub fn sorted(&self) -> Vec<&ServiceRecord> {
        let mut records: Vec<&ServiceRecord> = self.services.values().map(Arc::as_ref).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }
}

#[derive(Default)]
struct State {
    services: HashMap<String, Arc<ServiceRecord>>,
    revision: u64,
    closed: bool,
}

/// Thread-safe set of discovered services with edge-triggered change waiting.
///
/// Entries, revision and the closed flag live under one mutex; the condvar
/// is always waited on with that same mutex, so a waiter that captured a
/// revision from `snapshot()` can never miss a change made before it blocks.
pub struct ServiceRegistry {
    service_type: String,
    state: Mutex<State>,
    changed: Condvar,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl ServiceRegistry {
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            subscription: Mutex::new(None),
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Bind the discovery subscription released by `close()`.
    pub fn attach(&self, mut subscription: Box<dyn Subscription>) {
        // Held across the closed check so a concurrent close() cannot miss it
        let mut slot = self.subscription.lock();
        if self.is_closed() {
            drop(slot);
            subscription.close();
            return;
        }
        let previous = slot.replace(subscription);
        drop(slot);
        if let Some(mut previous) = previous {
            previous.close();
        }
    }

    /// Insert or replace the record stored under `record.name`.
    pub fn add_or_replace(&self, record: ServiceRecord) {
        let mut state = self.state.lock();
        if state.closed {
            tracing::debug!("Ignoring {} after close", record.name);
            return;
        }
        state.services.insert(record.name.clone(), Arc::new(record));
        state.revision += 1;
        self.changed.notify_all();
    }

    /// Remove `name` if present. Returns whether anything changed.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.services.remove(name).is_none() {
            return false;
        }
        state.revision += 1;
        self.changed.notify_all();
        true
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            revision: state.revision,
            services: state.services.clone(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Block until the revision differs from `since` or `timeout` elapses.
    ///
    /// Returns `true` on change, `false` on timeout or once closed. A zero
    /// timeout is replaced by the default heartbeat interval.
    pub fn wait_for_change(&self, since: u64, timeout: Duration) -> bool {
        let timeout = if timeout.is_zero() {
            tracing::warn!(
                "Non-positive wait timeout; using {}s",
                DEFAULT_HEARTBEAT_SECS
            );
            Duration::from_secs_f64(DEFAULT_HEARTBEAT_SECS)
        } else {
            timeout
        };
        // None when the deadline is not representable: wait without one
        let deadline = Instant::now().checked_add(timeout);

        let mut state = self.state.lock();
        while !state.closed && state.revision == since {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }

        !state.closed && state.revision != since
    }

    /// Release the discovery subscription and wake every waiter.
    /// Later mutations are ignored and waits return `false` immediately.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            self.changed.notify_all();
        }

        if let Some(mut subscription) = self.subscription.lock().take() {
            subscription.close();
        }
        tracing::info!("Closed registry for {}", self.service_type);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl ServiceHandler for ServiceRegistry {
    fn on_added(&self, record: ServiceRecord) {
        tracing::debug!("Service added: {}", record.name);
        self.add_or_replace(record);
    }

    fn on_removed(&self, service_type: &str, name: &str) {
        if self.remove(name) {
            tracing::debug!("Service removed: {}", name);
        } else {
            tracing::debug!("Ignoring removal of unknown {} ({})", name, service_type);
        }
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const PRINTER: &str = "printer._http._tcp.local.";

    fn test_record(name: &str) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))],
            port: 631,
            host: "printer.local.".to_string(),
            attributes: HashMap::new(),
        }
    }

    struct CountingSubscription(Arc<AtomicUsize>);

    impl Subscription for CountingSubscription {
        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_then_remove() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        assert_eq!(registry.revision(), 0);

        registry.add_or_replace(test_record(PRINTER));
        let snap = registry.snapshot();
        assert_eq!(snap.revision, 1);
        assert_eq!(snap.services.len(), 1);
        assert_eq!(*snap.services[PRINTER], test_record(PRINTER));

        assert!(registry.remove(PRINTER));
        let snap = registry.snapshot();
        assert_eq!(snap.revision, 2);
        assert!(snap.services.is_empty());
    }

    #[test]
    fn test_replace_counts_as_change() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        registry.add_or_replace(test_record(PRINTER));

        let mut updated = test_record(PRINTER);
        updated.port = 8631;
        registry.add_or_replace(updated);

        let snap = registry.snapshot();
        assert_eq!(snap.revision, 2);
        assert_eq!(snap.services.len(), 1);
        assert_eq!(snap.services[PRINTER].port, 8631);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_changes() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        registry.add_or_replace(test_record(PRINTER));
        let before = registry.snapshot();

        registry.remove(PRINTER);
        assert_eq!(before.services.len(), 1);
        assert_eq!(before.revision, 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));
        assert!(!registry.remove("nonexistent"));
        assert_eq!(registry.revision(), 0);

        // A blocked waiter must not be woken by the no-op removal
        let waiter = {
            let registry = registry.clone();
            thread::spawn(move || registry.wait_for_change(0, Duration::from_millis(300)))
        };
        thread::sleep(Duration::from_millis(50));
        registry.remove("nonexistent");
        assert!(!waiter.join().unwrap());
        assert_eq!(registry.revision(), 0);
    }

    #[test]
    fn test_wait_times_out_without_change() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        for i in 0..5 {
            registry.add_or_replace(test_record(&format!("svc{}._http._tcp.local.", i)));
        }
        let since = registry.snapshot().revision;
        assert_eq!(since, 5);

        let start = Instant::now();
        assert!(!registry.wait_for_change(since, Duration::from_millis(200)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "overslept: {:?}", elapsed);
    }

    #[test]
    fn test_change_before_wait_is_not_lost() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        let since = registry.snapshot().revision;

        // Mutation lands between snapshot and wait
        registry.add_or_replace(test_record(PRINTER));

        let start = Instant::now();
        assert!(registry.wait_for_change(since, Duration::from_secs(2)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_concurrent_add_wakes_waiter() {
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));
        let since = registry.snapshot().revision;

        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                registry.add_or_replace(test_record(PRINTER));
            })
        };

        let start = Instant::now();
        assert!(registry.wait_for_change(since, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        writer.join().unwrap();
    }

    #[test]
    fn test_change_wakes_all_waiters() {
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.wait_for_change(0, Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        registry.add_or_replace(test_record(PRINTER));

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        let start = Instant::now();
        assert!(!registry.wait_for_change(0, Duration::ZERO));
        assert!(start.elapsed() >= Duration::from_secs_f64(DEFAULT_HEARTBEAT_SECS));
    }

    #[test]
    fn test_unbounded_timeout_still_wakes_on_change() {
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));
        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                registry.add_or_replace(test_record(PRINTER));
            })
        };

        assert!(registry.wait_for_change(0, Duration::MAX));
        writer.join().unwrap();
    }

    #[test]
    fn test_close_unblocks_waiter() {
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));
        let waiter = {
            let registry = registry.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let changed = registry.wait_for_change(0, Duration::from_secs(30));
                (changed, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        registry.close();

        let (changed, elapsed) = waiter.join().unwrap();
        assert!(!changed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_closed_registry_ignores_mutations() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        registry.add_or_replace(test_record(PRINTER));
        registry.close();

        registry.add_or_replace(test_record("other._http._tcp.local."));
        assert!(!registry.remove(PRINTER));
        assert_eq!(registry.revision(), 1);

        let start = Instant::now();
        assert!(!registry.wait_for_change(0, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_close_releases_subscription_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = ServiceRegistry::new("_http._tcp.local.");
        registry.attach(Box::new(CountingSubscription(closes.clone())));

        registry.close();
        registry.close();
        drop(registry);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_after_close_releases_immediately() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = ServiceRegistry::new("_http._tcp.local.");
        registry.close();

        registry.attach(Box::new(CountingSubscription(closes.clone())));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_dispatch() {
        let registry = ServiceRegistry::new("_http._tcp.local.");
        let handler: &dyn ServiceHandler = &registry;

        handler.on_added(test_record(PRINTER));
        handler.on_removed("_http._tcp.local.", "nonexistent");
        assert_eq!(registry.revision(), 1);

        handler.on_removed("_http._tcp.local.", PRINTER);
        assert_eq!(registry.revision(), 2);
    }

    #[test]
    fn test_revision_counts_each_change_under_concurrency() {
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let name = format!("w{}-{}._http._tcp.local.", w, i);
                        registry.add_or_replace(test_record(&name));
                        assert!(registry.remove(&name));
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(registry.revision(), 4 * 50 * 2);
        assert!(registry.snapshot().services.is_empty());
    }

    #[test]
    fn test_snapshots_are_consistent_prefixes() {
        // A single writer adds svc0..svcN in order; every snapshot must hold
        // exactly the first `revision` of them.
        const N: usize = 200;
        let registry = Arc::new(ServiceRegistry::new("_http._tcp.local."));

        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..N {
                    registry.add_or_replace(test_record(&format!("svc{}._http._tcp.local.", i)));
                }
            })
        };

        let mut last = 0;
        loop {
            let snap = registry.snapshot();
            assert!(snap.revision >= last, "revision went backwards");
            last = snap.revision;

            assert_eq!(snap.services.len() as u64, snap.revision);
            for i in 0..snap.revision {
                let name = format!("svc{}._http._tcp.local.", i);
                assert!(snap.services.contains_key(&name), "missing {}", name);
            }
            if snap.revision == N as u64 {
                break;
            }
        }
        writer.join().unwrap();
    }
}

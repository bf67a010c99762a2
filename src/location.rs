use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use thiserror::Error;

use crate::{
    dispatch::ExecContext,
    protocol::LocationUpdate,
    registry::{Registry, RegistrationId},
};

/// Most recently applied location fix. Overwritten wholesale by
/// [LocationUpdater::apply], never partially; process lifetime state.
#[derive(Debug, Default, Clone, Copy)]
struct LocationSnapshot {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f32,
    bearing: f32,
    accuracy: f32,

    /// Milliseconds since UNIX epoch, ≤ 0 means "absent"
    timestamp_ms: i64,

    /// Cross referenced from the satellite updater
    satellite_count: u32,
}

/// Consumer visible location value, materialized from the snapshot
/// and tagged with the provider the consumer subscribed under.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub provider: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f32,
    pub bearing: f32,
    pub accuracy: f32,

    /// Milliseconds since UNIX epoch
    pub timestamp_ms: i64,

    /// Monotonic time since process start
    pub elapsed_boot_nanos: u64,

    /// Number of satellites used, only carried when non zero
    pub satellites: Option<u32>,
}

/// Persistent location consumer.
pub trait LocationListener: Send + Sync {
    /// Synthetic notification fired once at registration time.
    fn on_provider_enabled(&self, provider: &str);

    /// Fired once per applied update.
    fn on_location_changed(&self, fix: LocationFix);
}

/// One shot addressable recipient. Unlike a [LocationListener],
/// a failing send means the target is gone and causes its
/// automatic deregistration.
pub trait PendingTarget: Send + Sync {
    fn send(&self, event: TargetEvent) -> Result<(), TargetGone>;
}

/// Message shapes sent to a [PendingTarget].
#[derive(Debug, Clone)]
pub enum TargetEvent {
    ProviderEnabled(String),
    LocationChanged(LocationFix),
}

#[derive(Debug, Error)]
#[error("delivery target is gone")]
pub struct TargetGone;

/// A [PendingTarget] backed by an unbounded channel: the natural
/// shape for consumers that drain events from a receiver. The send
/// fails once the receiving half is dropped.
impl PendingTarget for tokio::sync::mpsc::UnboundedSender<TargetEvent> {
    fn send(&self, event: TargetEvent) -> Result<(), TargetGone> {
        tokio::sync::mpsc::UnboundedSender::send(self, event).map_err(|_| TargetGone)
    }
}

#[derive(Clone)]
struct ListenerEntry {
    provider: String,
    listener: Arc<dyn LocationListener>,
    ctx: ExecContext,
}

#[derive(Clone)]
struct TargetEntry {
    provider: String,
    target: Arc<dyn PendingTarget>,
}

/// Owns the location snapshot and both location registries.
pub struct LocationUpdater {
    snapshot: Mutex<LocationSnapshot>,
    listeners: Registry<ListenerEntry>,
    targets: Registry<TargetEntry>,
    boot: Instant,
}

impl Default for LocationUpdater {
    fn default() -> Self {
        Self {
            snapshot: Mutex::new(LocationSnapshot::default()),
            listeners: Registry::default(),
            targets: Registry::default(),
            boot: Instant::now(),
        }
    }
}

impl LocationUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one producer update: overwrites the snapshot wholesale,
    /// then notifies every registered listener and pending target
    /// exactly once, in registration order. The snapshot write is
    /// skipped entirely while nothing is registered, nothing can
    /// observe it.
    pub fn apply(&self, update: &LocationUpdate) {
        if self.listeners.is_empty() && self.targets.is_empty() {
            return;
        }

        {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());

            let satellite_count = snapshot.satellite_count;

            *snapshot = LocationSnapshot {
                latitude: update.latitude,
                longitude: update.longitude,
                altitude: update.altitude,
                speed: update.speed as f32,
                bearing: update.bearing as f32,
                accuracy: update.accuracy as f32,
                timestamp_ms: update.timestamp,
                satellite_count,
            };
        }

        // fan-out over a snapshot copy of each registry, so a listener
        // may synchronously re-enter add/remove without deadlocking
        for (_, entry) in self.listeners.entries() {
            if let Some(fix) = self.get(&entry.provider) {
                let listener = entry.listener.clone();
                entry
                    .ctx
                    .deliver(Box::new(move || listener.on_location_changed(fix)));
            }
        }

        let mut gone = Vec::new();

        for (id, entry) in self.targets.entries() {
            if let Some(fix) = self.get(&entry.provider) {
                if entry.target.send(TargetEvent::LocationChanged(fix)).is_err() {
                    gone.push(id);
                }
            }
        }

        for id in gone {
            self.targets.remove(id);
        }
    }

    /// Materializes the current fix, tagged with `provider`.
    /// `None` until a first update with a positive timestamp arrives.
    pub fn get(&self, provider: &str) -> Option<LocationFix> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());

        if snapshot.timestamp_ms <= 0 {
            return None;
        }

        Some(LocationFix {
            provider: provider.to_string(),
            latitude: snapshot.latitude,
            longitude: snapshot.longitude,
            altitude: snapshot.altitude,
            speed: snapshot.speed,
            bearing: snapshot.bearing,
            accuracy: snapshot.accuracy,
            timestamp_ms: snapshot.timestamp_ms,
            elapsed_boot_nanos: self.boot.elapsed().as_nanos() as u64,
            satellites: match snapshot.satellite_count {
                0 => None,
                n => Some(n),
            },
        })
    }

    /// Registers a persistent listener. A synthetic "provider enabled"
    /// notification is delivered through `ctx` before the listener
    /// joins the registry, so a late joining consumer is told the
    /// pseudo provider is live.
    pub fn add_listener(
        &self,
        provider: &str,
        listener: Arc<dyn LocationListener>,
        ctx: ExecContext,
    ) -> RegistrationId {
        let name = provider.to_string();
        let notified = listener.clone();

        ctx.deliver(Box::new(move || notified.on_provider_enabled(&name)));

        self.listeners.add(ListenerEntry {
            provider: provider.to_string(),
            listener,
            ctx,
        })
    }

    pub fn remove_listener(&self, id: RegistrationId) {
        self.listeners.remove(id);
    }

    /// Registers a one shot delivery target. The synchronous
    /// "provider enabled" send doubles as a liveness check: when it
    /// fails the target is presumed gone and never registered.
    pub fn add_pending_target(
        &self,
        provider: &str,
        target: Arc<dyn PendingTarget>,
    ) -> Option<RegistrationId> {
        if target
            .send(TargetEvent::ProviderEnabled(provider.to_string()))
            .is_err()
        {
            return None;
        }

        Some(self.targets.add(TargetEntry {
            provider: provider.to_string(),
            target,
        }))
    }

    pub fn remove_pending_target(&self, id: RegistrationId) {
        self.targets.remove(id);
    }

    /// Cross cutting side effect of a satellite update: the count must
    /// be visible on the next location read, even without an
    /// intervening location update.
    pub(crate) fn set_satellite_count(&self, count: u32) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        snapshot.satellite_count = count;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    fn update(timestamp: i64) -> LocationUpdate {
        LocationUpdate {
            latitude: 48.8584,
            longitude: 2.2945,
            altitude: 330.0,
            speed: 1.25,
            bearing: 270.5,
            accuracy: 3.9,
            timestamp,
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl LocationListener for Recorder {
        fn on_provider_enabled(&self, provider: &str) {
            self.events.lock().unwrap().push(format!("enabled:{}", provider));
        }

        fn on_location_changed(&self, fix: LocationFix) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fix:{}:{}", fix.provider, fix.timestamp_ms));
        }
    }

    #[test]
    fn absent_until_first_valid_update() {
        let updater = LocationUpdater::new();
        assert!(updater.get("gps").is_none());

        let listener = Arc::new(Recorder::default());
        updater.add_listener("gps", listener, ExecContext::Inline);

        // timestamp ≤ 0 keeps the snapshot absent
        updater.apply(&update(0));
        assert!(updater.get("gps").is_none());

        updater.apply(&update(1_700_000_000_000));
        assert!(updater.get("gps").is_some());
    }

    #[test]
    fn get_reflects_applied_fields() {
        let updater = LocationUpdater::new();
        let listener = Arc::new(Recorder::default());
        updater.add_listener("gps", listener, ExecContext::Inline);

        let input = update(1_700_000_000_000);
        updater.apply(&input);

        let fix = updater.get("network").unwrap();
        assert_eq!(fix.provider, "network");
        assert_eq!(fix.latitude, input.latitude);
        assert_eq!(fix.longitude, input.longitude);
        assert_eq!(fix.altitude, input.altitude);
        assert_eq!(fix.speed, input.speed as f32);
        assert_eq!(fix.bearing, input.bearing as f32);
        assert_eq!(fix.accuracy, input.accuracy as f32);
        assert_eq!(fix.timestamp_ms, input.timestamp);
        assert_eq!(fix.satellites, None);
    }

    #[test]
    fn provider_enabled_fires_before_any_update() {
        let updater = LocationUpdater::new();
        let listener = Arc::new(Recorder::default());

        updater.add_listener("gps", listener.clone(), ExecContext::Inline);
        assert_eq!(listener.events(), vec!["enabled:gps"]);

        updater.apply(&update(100));
        assert_eq!(listener.events(), vec!["enabled:gps", "fix:gps:100"]);
    }

    #[test]
    fn fan_out_in_registration_order() {
        let updater = LocationUpdater::new();

        let shared = Arc::new(Mutex::new(Vec::new()));

        struct Tagged {
            tag: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }

        impl LocationListener for Tagged {
            fn on_provider_enabled(&self, _: &str) {}
            fn on_location_changed(&self, _: LocationFix) {
                self.order.lock().unwrap().push(self.tag);
            }
        }

        updater.add_listener(
            "gps",
            Arc::new(Tagged {
                tag: "a",
                order: shared.clone(),
            }),
            ExecContext::Inline,
        );

        let b = updater.add_listener(
            "gps",
            Arc::new(Tagged {
                tag: "b",
                order: shared.clone(),
            }),
            ExecContext::Inline,
        );

        updater.add_listener(
            "gps",
            Arc::new(Tagged {
                tag: "c",
                order: shared.clone(),
            }),
            ExecContext::Inline,
        );

        updater.apply(&update(100));
        assert_eq!(*shared.lock().unwrap(), vec!["a", "b", "c"]);

        // a removed listener is never notified again
        updater.remove_listener(b);
        updater.apply(&update(200));
        assert_eq!(*shared.lock().unwrap(), vec!["a", "b", "c", "a", "c"]);
    }

    #[test]
    fn no_consumers_skips_snapshot_write() {
        let updater = LocationUpdater::new();
        updater.apply(&update(100));

        // nothing was registered, nothing observable happened;
        // register a listener and confirm the old update left no trace
        let listener = Arc::new(Recorder::default());
        updater.add_listener("gps", listener, ExecContext::Inline);
        assert!(updater.get("gps").is_none());
    }

    #[test]
    fn dead_target_rejected_at_registration() {
        let updater = LocationUpdater::new();

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);

        assert!(updater.add_pending_target("gps", Arc::new(tx)).is_none());
    }

    #[test]
    fn failing_target_is_deregistered_on_delivery() {
        let updater = LocationUpdater::new();

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let id = updater.add_pending_target("gps", Arc::new(tx));
        assert!(id.is_some());

        let mut rx = rx;
        match rx.try_recv() {
            Ok(TargetEvent::ProviderEnabled(provider)) => assert_eq!(provider, "gps"),
            other => panic!("expected provider enabled event, got {:?}", other),
        }

        updater.apply(&update(100));
        match rx.try_recv() {
            Ok(TargetEvent::LocationChanged(fix)) => assert_eq!(fix.timestamp_ms, 100),
            other => panic!("expected location event, got {:?}", other),
        }

        // receiver gone: next delivery fails and silently deregisters
        drop(rx);
        updater.apply(&update(200));
        assert_eq!(updater.get("gps").unwrap().timestamp_ms, 200);

        // the registry is empty again, so further updates skip the
        // snapshot write entirely
        updater.apply(&update(300));
        assert_eq!(updater.get("gps").unwrap().timestamp_ms, 200);
    }
}

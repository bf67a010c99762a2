use std::sync::{Arc, Mutex};

use crate::{
    dispatch::ExecContext,
    location::LocationUpdater,
    protocol::SatelliteEntry,
    registry::{Registry, RegistrationId},
    svid::{self, SvidShifts},
};

/// Fixed capacity of the satellite snapshot. Updates carrying more
/// entries are silently clamped.
pub const MAX_SVS: usize = 64;

/// Synthetic time to first fix reported to newly registered
/// consumers, milliseconds.
pub const TIME_TO_FIRST_FIX_MS: u32 = 5000;

/// Parallel fixed capacity arrays, index i across all of them
/// describes one satellite. Only the first `count` entries are
/// meaningful. Overwritten wholesale, process lifetime state.
struct SatelliteSnapshot {
    count: usize,
    prn: [i32; MAX_SVS],
    snr: [f32; MAX_SVS],
    elv: [f32; MAX_SVS],
    azm: [f32; MAX_SVS],

    /// Carrier frequency, never populated from input
    freq: [f32; MAX_SVS],
}

impl Default for SatelliteSnapshot {
    fn default() -> Self {
        Self {
            count: 0,
            prn: [0; MAX_SVS],
            snr: [0.0; MAX_SVS],
            elv: [0.0; MAX_SVS],
            azm: [0.0; MAX_SVS],
            freq: [0.0; MAX_SVS],
        }
    }
}

/// Immutable per satellite status value handed to batch callbacks
/// and returned by [SatelliteUpdater::get].
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteStatus {
    pub count: usize,

    /// Packed platform identifiers, see [crate::svid::encode]
    pub svid_with_flags: Vec<i32>,

    pub snr: Vec<f32>,
    pub elv: Vec<f32>,
    pub azm: Vec<f32>,
    pub freq: Vec<f32>,
}

/// Legacy per event consumer: receives an event tag only and is
/// expected to re-query state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsStatusEvent {
    Started,
    FirstFix,
    SatelliteStatus,
}

pub trait GpsStatusListener: Send + Sync {
    fn on_gps_status_changed(&self, event: GpsStatusEvent);
}

/// Modern batch consumer: receives a freshly built immutable
/// [SatelliteStatus] per update.
pub trait GnssStatusCallback: Send + Sync {
    fn on_started(&self);
    fn on_first_fix(&self, ttff_ms: u32);
    fn on_satellite_status(&self, status: SatelliteStatus);
}

#[derive(Clone)]
struct ListenerEntry {
    listener: Arc<dyn GpsStatusListener>,
    ctx: ExecContext,
}

#[derive(Clone)]
struct CallbackEntry {
    callback: Arc<dyn GnssStatusCallback>,
    ctx: ExecContext,
}

/// Owns the satellite snapshot and both satellite registries.
pub struct SatelliteUpdater {
    snapshot: Mutex<SatelliteSnapshot>,
    listeners: Registry<ListenerEntry>,
    callbacks: Registry<CallbackEntry>,
    location: Arc<LocationUpdater>,
    shifts: SvidShifts,
}

impl SatelliteUpdater {
    pub fn new(location: Arc<LocationUpdater>, shifts: SvidShifts) -> Self {
        Self {
            snapshot: Mutex::new(SatelliteSnapshot::default()),
            listeners: Registry::default(),
            callbacks: Registry::default(),
            location,
            shifts,
        }
    }

    /// Applies one producer update. The clamped count is written into
    /// the location snapshot unconditionally, even with no satellite
    /// consumers registered; per satellite fields are only copied and
    /// fanned out when someone is listening.
    pub fn apply(&self, entries: &[SatelliteEntry]) {
        if entries.is_empty() {
            return;
        }

        let count = entries.len().min(MAX_SVS);
        self.location.set_satellite_count(count as u32);

        if self.listeners.is_empty() && self.callbacks.is_empty() {
            return;
        }

        {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());

            snapshot.count = count;

            for (i, entry) in entries.iter().take(count).enumerate() {
                snapshot.prn[i] = entry.prn;
                snapshot.snr[i] = entry.snr as f32;
                snapshot.elv[i] = entry.elv as f32;
                snapshot.azm[i] = entry.azm as f32;
            }
        }

        for (_, entry) in self.listeners.entries() {
            let listener = entry.listener.clone();
            entry.ctx.deliver(Box::new(move || {
                listener.on_gps_status_changed(GpsStatusEvent::SatelliteStatus)
            }));
        }

        for (_, entry) in self.callbacks.entries() {
            let status = self.get();
            let callback = entry.callback.clone();
            entry
                .ctx
                .deliver(Box::new(move || callback.on_satellite_status(status)));
        }
    }

    /// Builds the current status value. Pure read of snapshot state.
    pub fn get(&self) -> SatelliteStatus {
        let snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());

        let count = snapshot.count;

        SatelliteStatus {
            count,
            svid_with_flags: snapshot.prn[..count]
                .iter()
                .map(|prn| svid::encode(*prn, self.shifts))
                .collect(),
            snr: snapshot.snr[..count].to_vec(),
            elv: snapshot.elv[..count].to_vec(),
            azm: snapshot.azm[..count].to_vec(),
            freq: snapshot.freq[..count].to_vec(),
        }
    }

    /// Registers a legacy consumer. Synthetic started / first-fix
    /// events fire through `ctx` before registration.
    pub fn add_gps_status_listener(
        &self,
        listener: Arc<dyn GpsStatusListener>,
        ctx: ExecContext,
    ) -> RegistrationId {
        let notified = listener.clone();

        ctx.deliver(Box::new(move || {
            notified.on_gps_status_changed(GpsStatusEvent::Started);
            notified.on_gps_status_changed(GpsStatusEvent::FirstFix);
        }));

        self.listeners.add(ListenerEntry { listener, ctx })
    }

    pub fn remove_gps_status_listener(&self, id: RegistrationId) {
        self.listeners.remove(id);
    }

    /// Registers a batch callback. Synthetic started / first-fix
    /// notifications fire through `ctx` before registration.
    pub fn add_gnss_status_callback(
        &self,
        callback: Arc<dyn GnssStatusCallback>,
        ctx: ExecContext,
    ) -> RegistrationId {
        let notified = callback.clone();

        ctx.deliver(Box::new(move || {
            notified.on_started();
            notified.on_first_fix(TIME_TO_FIRST_FIX_MS);
        }));

        self.callbacks.add(CallbackEntry { callback, ctx })
    }

    pub fn remove_gnss_status_callback(&self, id: RegistrationId) {
        self.callbacks.remove(id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    fn entry(prn: i32) -> SatelliteEntry {
        SatelliteEntry {
            prn,
            snr: 40.0,
            elv: 45.0,
            azm: 180.0,
        }
    }

    fn updater() -> SatelliteUpdater {
        SatelliteUpdater::new(Arc::new(LocationUpdater::new()), SvidShifts::default())
    }

    #[derive(Default)]
    struct EventRecorder {
        events: Mutex<Vec<GpsStatusEvent>>,
    }

    impl GpsStatusListener for EventRecorder {
        fn on_gps_status_changed(&self, event: GpsStatusEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    struct StatusRecorder {
        started: Mutex<bool>,
        ttff: Mutex<Option<u32>>,
        statuses: Mutex<Vec<SatelliteStatus>>,
    }

    impl GnssStatusCallback for StatusRecorder {
        fn on_started(&self) {
            *self.started.lock().unwrap() = true;
        }

        fn on_first_fix(&self, ttff_ms: u32) {
            *self.ttff.lock().unwrap() = Some(ttff_ms);
        }

        fn on_satellite_status(&self, status: SatelliteStatus) {
            self.statuses.lock().unwrap().push(status);
        }
    }

    #[test]
    fn legacy_listener_gets_synthetic_events_first() {
        let updater = updater();
        let listener = Arc::new(EventRecorder::default());

        updater.add_gps_status_listener(listener.clone(), ExecContext::Inline);

        assert_eq!(
            *listener.events.lock().unwrap(),
            vec![GpsStatusEvent::Started, GpsStatusEvent::FirstFix]
        );

        updater.apply(&[entry(5)]);

        assert_eq!(
            *listener.events.lock().unwrap(),
            vec![
                GpsStatusEvent::Started,
                GpsStatusEvent::FirstFix,
                GpsStatusEvent::SatelliteStatus
            ]
        );
    }

    #[test]
    fn callback_receives_built_status() {
        let updater = updater();
        let callback = Arc::new(StatusRecorder::default());

        updater.add_gnss_status_callback(callback.clone(), ExecContext::Inline);

        assert!(*callback.started.lock().unwrap());
        assert_eq!(*callback.ttff.lock().unwrap(), Some(TIME_TO_FIRST_FIX_MS));

        updater.apply(&[entry(5), entry(70)]);

        let statuses = callback.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 1);

        let status = &statuses[0];
        assert_eq!(status.count, 2);
        assert_eq!(status.svid_with_flags[0], (5 << 8) + (1 << 4) + 7);
        assert_eq!(status.svid_with_flags[1], (6 << 8) + (3 << 4) + 7);
        assert_eq!(status.snr, vec![40.0, 40.0]);
        assert_eq!(status.freq, vec![0.0, 0.0]);
    }

    #[test]
    fn clamps_to_max_svs() {
        let updater = updater();
        let callback = Arc::new(StatusRecorder::default());
        updater.add_gnss_status_callback(callback.clone(), ExecContext::Inline);

        let entries = (1..=80).map(entry).collect::<Vec<_>>();
        updater.apply(&entries);

        let statuses = callback.statuses.lock().unwrap();
        assert_eq!(statuses[0].count, MAX_SVS);
        assert_eq!(statuses[0].svid_with_flags.len(), MAX_SVS);
    }

    #[test]
    fn count_crosses_into_location_snapshot() {
        let location = Arc::new(LocationUpdater::new());
        let updater = SatelliteUpdater::new(location.clone(), SvidShifts::default());

        // no satellite consumers registered: the count still crosses
        let entries = (1..=80).map(entry).collect::<Vec<_>>();
        updater.apply(&entries);

        // make the location snapshot readable
        struct Quiet;
        impl crate::location::LocationListener for Quiet {
            fn on_provider_enabled(&self, _: &str) {}
            fn on_location_changed(&self, _: crate::location::LocationFix) {}
        }

        location.add_listener("gps", Arc::new(Quiet), ExecContext::Inline);
        location.apply(&crate::protocol::LocationUpdate {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed: 0.0,
            bearing: 0.0,
            accuracy: 0.0,
            timestamp: 1,
        });

        let fix = location.get("gps").unwrap();
        assert_eq!(fix.satellites, Some(MAX_SVS as u32));
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let updater = updater();
        let listener = Arc::new(EventRecorder::default());
        updater.add_gps_status_listener(listener.clone(), ExecContext::Inline);

        updater.apply(&[]);

        assert_eq!(
            *listener.events.lock().unwrap(),
            vec![GpsStatusEvent::Started, GpsStatusEvent::FirstFix]
        );
        assert_eq!(updater.get().count, 0);
    }

    #[test]
    fn removed_callback_is_not_notified() {
        let updater = updater();
        let callback = Arc::new(StatusRecorder::default());

        let id = updater.add_gnss_status_callback(callback.clone(), ExecContext::Inline);
        updater.remove_gnss_status_callback(id);

        // keep one consumer so per satellite parsing still happens
        let other = Arc::new(StatusRecorder::default());
        updater.add_gnss_status_callback(other.clone(), ExecContext::Inline);

        updater.apply(&[entry(5)]);

        assert!(callback.statuses.lock().unwrap().is_empty());
        assert_eq!(other.statuses.lock().unwrap().len(), 1);
    }
}

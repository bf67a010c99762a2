use std::sync::Arc;

use crate::{
    dispatch::ExecContext,
    location::{LocationFix, LocationListener, LocationUpdater, PendingTarget},
    registry::RegistrationId,
    satellite::{GnssStatusCallback, GpsStatusListener, SatelliteStatus, SatelliteUpdater},
    svid::SvidShifts,
};

/// Long lived context owned by the composition root: both updaters,
/// wired together once, injected into the ingress components. The
/// adapter layer that intercepts positioning API calls talks to this
/// surface and to nothing below it.
pub struct Core {
    pub location: Arc<LocationUpdater>,
    pub satellites: Arc<SatelliteUpdater>,
}

impl Core {
    pub fn new(shifts: SvidShifts) -> Self {
        let location = Arc::new(LocationUpdater::new());
        let satellites = Arc::new(SatelliteUpdater::new(location.clone(), shifts));

        Self {
            location,
            satellites,
        }
    }

    pub fn register_location_listener(
        &self,
        provider: &str,
        listener: Arc<dyn LocationListener>,
        ctx: ExecContext,
    ) -> RegistrationId {
        self.location.add_listener(provider, listener, ctx)
    }

    pub fn unregister_location_listener(&self, id: RegistrationId) {
        self.location.remove_listener(id);
    }

    pub fn register_pending_target(
        &self,
        provider: &str,
        target: Arc<dyn PendingTarget>,
    ) -> Option<RegistrationId> {
        self.location.add_pending_target(provider, target)
    }

    pub fn unregister_pending_target(&self, id: RegistrationId) {
        self.location.remove_pending_target(id);
    }

    pub fn get_current_location(&self, provider: &str) -> Option<LocationFix> {
        self.location.get(provider)
    }

    pub fn register_legacy_satellite_listener(
        &self,
        listener: Arc<dyn GpsStatusListener>,
        ctx: ExecContext,
    ) -> RegistrationId {
        self.satellites.add_gps_status_listener(listener, ctx)
    }

    pub fn unregister_legacy_satellite_listener(&self, id: RegistrationId) {
        self.satellites.remove_gps_status_listener(id);
    }

    pub fn register_satellite_callback(
        &self,
        callback: Arc<dyn GnssStatusCallback>,
        ctx: ExecContext,
    ) -> RegistrationId {
        self.satellites.add_gnss_status_callback(callback, ctx)
    }

    pub fn unregister_satellite_callback(&self, id: RegistrationId) {
        self.satellites.remove_gnss_status_callback(id);
    }

    pub fn get_current_satellite_status(&self) -> SatelliteStatus {
        self.satellites.get()
    }
}

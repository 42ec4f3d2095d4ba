use crate::api::Api;
use crate::energy::SessionEnergyAccumulator;
use crate::export::ExportSerializer;
use crate::notice::Notifier;
use crate::poller::TelemetryPoller;
use crate::reading::{Field, Reading, ReadingBuffer};
use crate::registry::{Device, DeviceRegistry};
use crate::session::{lock, SessionGate, SessionStore};
use crate::window::{self, Chart, Horizon, LabelPrecision};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything shown for one logged-in user
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub devices: Vec<Device>,
    pub latest: Option<Reading>,
    pub voltage_current: Chart,
    pub watts: Chart,
    pub session_energy_wh: f64,
}

impl DashboardView {

    /// "No sensor data available"
    pub fn is_empty(&self) -> bool {
        self.latest.is_none()
    }
}

/// Energy of the current session, tagged with the session it belongs to
struct SessionEnergy {
    invalidations: u64,
    accumulator: SessionEnergyAccumulator,
}

/// The components of one active session, wired together
pub struct Dashboard {
    session: Arc<SessionStore>,
    registry: DeviceRegistry,
    poller: TelemetryPoller,
    exporter: ExportSerializer,
    energy: Mutex<SessionEnergy>,
    poll_interval: Duration,
}

impl Dashboard {

    pub fn new(api: Arc<dyn Api>, session: Arc<SessionStore>, notifier: Arc<dyn Notifier>,
        poll_interval: Duration, export_file_name: &str) -> Dashboard
    {
        let gate: Arc<dyn SessionGate> = session.clone();
        Dashboard {
            registry: DeviceRegistry::new(api.clone(), gate.clone(), notifier),
            poller: TelemetryPoller::new(api.clone(), gate.clone()),
            exporter: ExportSerializer::new(api, gate, export_file_name),
            energy: Mutex::new(SessionEnergy {
                invalidations: session.invalidations(),
                accumulator: SessionEnergyAccumulator::new(),
            }),
            session,
            poll_interval,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn poller(&self) -> &TelemetryPoller {
        &self.poller
    }

    pub fn exporter(&self) -> &ExportSerializer {
        &self.exporter
    }

    /// Load the devices and start polling; needs a tokio runtime
    pub fn open(&self) {
        if let Err(err) = self.registry.list() {
            warn!("claimed devices could not be loaded: {}", err);
        }
        self.poller.start(self.poll_interval);
    }

    /// Stop background work and forget the session energy
    pub fn close(&self) {
        self.poller.stop();
        self.with_energy(SessionEnergyAccumulator::reset);
        debug!("dashboard closed");
    }

    /// Feed a new buffer to the energy accumulator
    pub fn observe(&self, buffer: &ReadingBuffer) {
        self.with_energy(|energy| energy.observe(buffer));
    }

    /// Energy since login; zero again once the session has been invalidated
    pub fn session_energy_wh(&self) -> f64 {
        self.with_energy(|energy| energy.total_wh())
    }

    fn with_energy<R>(&self, f: impl FnOnce(&mut SessionEnergyAccumulator) -> R) -> R {
        let mut energy = lock(&self.energy);
        let invalidations = self.session.invalidations();
        if energy.invalidations != invalidations {
            debug!("session ended, session energy reset");
            energy.invalidations = invalidations;
            energy.accumulator.reset();
        }
        f(&mut energy.accumulator)
    }

    pub fn snapshot(&self, horizon: Horizon) -> DashboardView {
        let buffer = self.poller.buffer();
        let windowed = window::window(&buffer, horizon.count());
        DashboardView {
            devices: self.registry.devices().to_vec(),
            latest: window::latest(&buffer).cloned(),
            voltage_current: Chart::build(&windowed, &[Field::Voltage, Field::Current], LabelPrecision::Seconds),
            watts: Chart::build(&windowed, &[Field::Watts], LabelPrecision::Seconds),
            session_energy_wh: self.session_energy_wh(),
        }
    }

    /// Poll and render until `shutdown` resolves or the session ends.
    ///
    /// `render` is called with a fresh view after every buffer replacement.
    pub async fn watch<F, S>(&self, horizon: Horizon, mut render: F, shutdown: S)
    where
        F: FnMut(&DashboardView),
        S: Future<Output = ()>,
    {
        if !self.session.is_valid() {
            warn!("not watching sensor data without a valid session");
            return;
        }
        let mut updates = self.poller.subscribe();
        let mut validity = self.session.subscribe();
        tokio::pin!(shutdown);

        self.open();
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let buffer = updates.borrow_and_update().clone();
                    self.observe(&buffer);
                    render(&self.snapshot(horizon));
                }
                changed = validity.changed() => {
                    if changed.is_err() || !*validity.borrow_and_update() {
                        info!("session ended");
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
            }
        }
        self.close();
    }
}

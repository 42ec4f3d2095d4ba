use crate::api::{Api, ApiError};
use crate::reading::ReadingBuffer;
use crate::session::{lock, SessionGate};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A poll did not produce a new buffer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {

    #[error("not logged in")]
    Unauthorized,

    #[error("sensor data unreachable: {0}")]
    Network(String),

    #[error("sensor data malformed: {0}")]
    Malformed(String),

    /// Another fetch is still outstanding; this one was skipped
    #[error("a fetch is already in flight")]
    InFlight,

    /// The poller was stopped while this fetch was outstanding
    #[error("poller was stopped")]
    Cancelled,
}

struct PollState {
    buffer: ReadingBuffer,

    /// Bumped by every `stop()`; a scheduled fetch only swaps if it still matches
    generation: u64,
}

struct Shared {
    api: Arc<dyn Api>,
    session: Arc<dyn SessionGate>,
    state: Mutex<PollState>,
    published: watch::Sender<ReadingBuffer>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the single-flight flag once the HTTP request is over.
///
/// Owned by the blocking request, which keeps running after an abort.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {

    async fn fetch(&self, generation: Option<u64>) -> Result<ReadingBuffer, FetchError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("fetch skipped, previous one still outstanding");
            return Err(FetchError::InFlight);
        }
        let guard = InFlightGuard(self.in_flight.clone());

        let credential = self.session.credential().ok_or(FetchError::Unauthorized)?;
        let api = self.api.clone();
        let outcome = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                api.sensor_data(&credential)
            })
            .await
            .map_err(|err| FetchError::Network(format!("fetch task failed: {}", err)))?;

        let readings = match outcome {
            Ok(readings) => readings,
            Err(ApiError::Unauthorized) => {
                self.session.on_unauthorized();
                return Err(FetchError::Unauthorized);
            }
            Err(ApiError::Malformed(msg)) => return Err(FetchError::Malformed(msg)),
            Err(err) => return Err(FetchError::Network(err.to_string())),
        };

        let buffer = ReadingBuffer::from_server(readings)
            .map_err(|err| FetchError::Malformed(err.to_string()))?;
        if !buffer.is_descending() {
            warn!("sensor data is not ordered newest first; showing it as received");
        }

        let mut state = lock(&self.state);
        if generation.is_some_and(|g| g != state.generation) {
            debug!("poller stopped during fetch, dropping {} readings", buffer.len());
            return Err(FetchError::Cancelled);
        }
        state.buffer = buffer.clone();
        self.published.send_replace(buffer.clone());
        debug!("buffer replaced with {} readings", buffer.len());
        Ok(buffer)
    }
}

/// Periodically replaces the reading buffer with the server's latest readings
pub struct TelemetryPoller {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryPoller {

    pub fn new(api: Arc<dyn Api>, session: Arc<dyn SessionGate>) -> TelemetryPoller {
        let (published, _) = watch::channel(ReadingBuffer::default());
        TelemetryPoller {
            shared: Arc::new(Shared {
                api,
                session,
                state: Mutex::new(PollState { buffer: ReadingBuffer::default(), generation: 0 }),
                published,
                in_flight: Arc::new(AtomicBool::new(false)),
            }),
            task: Mutex::new(None),
        }
    }

    /// The buffer of the last successful fetch
    pub fn buffer(&self) -> ReadingBuffer {
        lock(&self.shared.state).buffer.clone()
    }

    /// Notified with every replaced buffer
    pub fn subscribe(&self) -> watch::Receiver<ReadingBuffer> {
        self.shared.published.subscribe()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Fetch once, now; a failure leaves the buffer as it was
    pub async fn fetch_once(&self) -> Result<ReadingBuffer, FetchError> {
        self.shared.fetch(None).await
    }

    /// Poll every `interval`, starting immediately.
    ///
    /// Must be called within a tokio runtime. Ticks that come due while a
    /// fetch is outstanding are skipped. The poller stops by itself when the
    /// session becomes invalid.
    pub fn start(&self, interval: Duration) {
        if !self.shared.session.is_valid() {
            warn!("not polling sensor data without a valid session");
            return;
        }
        self.stop();

        let generation = lock(&self.shared.state).generation;
        let shared = self.shared.clone();
        let mut validity = shared.session.subscribe();

        info!("polling sensor data every {}ms", interval.as_millis());
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match shared.fetch(Some(generation)).await {
                            Ok(_) | Err(FetchError::InFlight) => (),
                            Err(FetchError::Unauthorized) => {
                                info!("session is no longer valid, polling stopped");
                                return;
                            }
                            Err(FetchError::Cancelled) => return,
                            Err(err) => warn!("{}; keeping the previous readings", err),
                        }
                    }
                    changed = validity.changed() => {
                        if changed.is_err() || !*validity.borrow_and_update() {
                            info!("session ended, polling stopped");
                            return;
                        }
                    }
                }
            }
        });
        *lock(&self.task) = Some(task);
    }

    /// Stop polling; once this returns no scheduled fetch replaces the buffer
    pub fn stop(&self) {
        lock(&self.shared.state).generation += 1;
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            debug!("polling task cancelled");
        }
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

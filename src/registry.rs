use crate::api::{Api, ApiError};
use crate::notice::{Notice, Notifier};
use crate::session::{lock, SessionGate};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

/// A device claimed by the logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
}

/// Claiming or releasing a device did not succeed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClaimError {

    /// The id/key pair was refused
    #[error("{0}")]
    InvalidCredentials(String),

    /// The device belongs to another account
    #[error("{0}")]
    AlreadyClaimed(String),

    /// Unclaim was refused, e.g. the device is not ours
    #[error("{0}")]
    Rejected(String),

    /// No valid session, or the server just invalidated it
    #[error("not logged in")]
    Unauthorized,

    #[error("device registry unreachable: {0}")]
    Network(String),
}

/// Local mirror of the devices the server says we own
pub struct DeviceRegistry {
    api: Arc<dyn Api>,
    session: Arc<dyn SessionGate>,
    notifier: Arc<dyn Notifier>,
    devices: Mutex<Arc<Vec<Device>>>,
}

impl DeviceRegistry {

    pub fn new(api: Arc<dyn Api>, session: Arc<dyn SessionGate>, notifier: Arc<dyn Notifier>) -> DeviceRegistry {
        DeviceRegistry {
            api,
            session,
            notifier,
            devices: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Devices as of the last successful `list()`
    pub fn devices(&self) -> Arc<Vec<Device>> {
        lock(&self.devices).clone()
    }

    /// Re-fetch the claimed devices and replace the local mirror with them
    pub fn list(&self) -> Result<Arc<Vec<Device>>, ClaimError> {
        let credential = self.session.credential().ok_or(ClaimError::Unauthorized)?;
        let ids = self.api.devices(&credential)
            .map_err(|err| self.classify(err, "Failed to fetch devices"))?;
        let devices = Arc::new(ids.into_iter().map(|id| Device { id }).collect::<Vec<_>>());
        debug!("{} devices claimed", devices.len());
        *lock(&self.devices) = devices.clone();
        Ok(devices)
    }

    pub fn claim(&self, device_id: &str, device_key: &str) -> Result<(), ClaimError> {
        let credential = self.session.credential().ok_or(ClaimError::Unauthorized)?;
        self.api.claim(&credential, device_id, device_key)
            .map_err(|err| match err {
                ApiError::Status { code: 409, detail } => ClaimError::AlreadyClaimed(
                    detail.unwrap_or_else(|| "Device already claimed".to_string())),
                ApiError::Status { detail, .. } => ClaimError::InvalidCredentials(
                    detail.unwrap_or_else(|| "Failed to claim device".to_string())),
                other => self.classify(other, "Failed to claim device"),
            })?;
        info!("claimed device {}", device_id);
        self.notifier.notify(&Notice::DeviceClaimed(device_id.to_string()));
        self.refresh_after_mutation();
        Ok(())
    }

    pub fn unclaim(&self, device_id: &str) -> Result<(), ClaimError> {
        let credential = self.session.credential().ok_or(ClaimError::Unauthorized)?;
        self.api.unclaim(&credential, device_id)
            .map_err(|err| self.classify(err, "Failed to unclaim device"))?;
        info!("unclaimed device {}", device_id);
        self.notifier.notify(&Notice::DeviceUnclaimed(device_id.to_string()));
        self.refresh_after_mutation();
        Ok(())
    }

    /// The mutation is committed on the server even if this re-read fails;
    /// the mirror then stays at its last confirmed state
    fn refresh_after_mutation(&self) {
        if let Err(err) = self.list() {
            warn!("device list could not be refreshed: {}", err);
        }
    }

    fn classify(&self, err: ApiError, fallback: &str) -> ClaimError {
        match err {
            ApiError::Unauthorized => {
                self.session.on_unauthorized();
                ClaimError::Unauthorized
            }
            ApiError::Status { detail, .. } =>
                ClaimError::Rejected(detail.unwrap_or_else(|| fallback.to_string())),
            ApiError::Transport(msg) | ApiError::Malformed(msg) => ClaimError::Network(msg),
        }
    }
}

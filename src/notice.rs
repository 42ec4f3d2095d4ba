use log::{info, warn};

/// Message meant for the person using the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SessionExpired,
    Registered,
    DeviceClaimed(String),
    DeviceUnclaimed(String),
    ExportSaved(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Notice::SessionExpired =>
                write!(f, "Session expired. Please log in again."),
            Notice::Registered =>
                write!(f, "User registered successfully! Now log in."),
            Notice::DeviceClaimed(id) =>
                write!(f, "Device {} claimed successfully!", id),
            Notice::DeviceUnclaimed(id) =>
                write!(f, "Device {} unclaimed successfully!", id),
            Notice::ExportSaved(path) =>
                write!(f, "Sensor data exported to {}", path),
        }
    }
}

/// Where notices go; injected into everything that raises one
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Notifier writing to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::SessionExpired => warn!("{}", notice),
            _ => info!("{}", notice),
        }
    }
}

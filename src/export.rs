use crate::api::{Api, ApiError};
use crate::reading::Reading;
use crate::session::SessionGate;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An export could not be produced or saved
#[derive(Debug, thiserror::Error)]
pub enum ExportError {

    #[error("not logged in")]
    Unauthorized,

    #[error("export failed: {0}")]
    Network(String),

    #[error("export could not be written: {0}")]
    Io(#[from] std::io::Error),

    #[error("export could not be rendered: {0}")]
    Csv(#[from] csv::Error),
}

/// A downloadable CSV artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl CsvExport {

    /// Write the artifact into `dir` under its file name
    pub fn save_in(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let path = dir.as_ref().join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        debug!("{} bytes written to {}", self.bytes.len(), path.display());
        Ok(path)
    }
}

/// Render readings as CSV, one row per reading in the given order
pub fn buffer_to_csv(readings: &[Reading]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for reading in readings {
        writer.serialize(reading)?;
    }
    writer.into_inner().map_err(|err| ExportError::Io(err.into_error()))
}

/// Produces CSV exports of the sensor data
pub struct ExportSerializer {
    api: Arc<dyn Api>,
    session: Arc<dyn SessionGate>,
    file_name: String,
}

impl ExportSerializer {

    pub fn new(api: Arc<dyn Api>, session: Arc<dyn SessionGate>, file_name: &str) -> ExportSerializer {
        ExportSerializer { api, session, file_name: file_name.to_string() }
    }

    /// The full reading history as rendered by the server
    pub fn export_csv(&self) -> Result<CsvExport, ExportError> {
        let credential = self.session.credential().ok_or(ExportError::Unauthorized)?;
        match self.api.sensor_data_csv(&credential) {
            Ok(bytes) => Ok(CsvExport { file_name: self.file_name.clone(), bytes }),
            Err(ApiError::Unauthorized) => {
                self.session.on_unauthorized();
                Err(ExportError::Unauthorized)
            }
            Err(err) => {
                warn!("sensor data export failed: {}", err);
                Err(ExportError::Network(err.detail().map_or_else(|| err.to_string(), str::to_string)))
            }
        }
    }

    /// The locally held readings, without asking the server
    pub fn export_local(&self, readings: &[Reading]) -> Result<CsvExport, ExportError> {
        Ok(CsvExport { file_name: self.file_name.clone(), bytes: buffer_to_csv(readings)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::testing::RecordingNotifier;
    use crate::notice::Notice;
    use crate::reading::reading;
    use crate::session::{CredentialFile, SessionStore};
    use crate::testing::FakeApi;

    fn exporter(dir: &tempfile::TempDir) -> (Arc<FakeApi>, Arc<SessionStore>, Arc<RecordingNotifier>, ExportSerializer) {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let session = Arc::new(SessionStore::new(
            api.clone(), CredentialFile::new(dir.path().join("token")), notifier.clone()));
        session.login("ann@example.com", "secret").unwrap();
        let exporter = ExportSerializer::new(api.clone(), session.clone(), "sensor_data.csv");
        (api, session, notifier, exporter)
    }

    #[test]
    fn remote_export_is_saved_under_fixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let (api, _, _, exporter) = exporter(&dir);
        api.set_readings(Ok(vec![reading("2025-03-01T10:00:02", 5.0)]));

        let export = exporter.export_csv().unwrap();
        let path = export.save_in(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("sensor_data.csv"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("device_id,timestamp"));
        assert!(content.contains("dev-1,2025-03-01T10:00:02"));
    }

    #[test]
    fn unauthorized_export_expires_session() {
        let dir = tempfile::tempdir().unwrap();
        let (api, session, notifier, exporter) = exporter(&dir);
        api.revoke_tokens();
        assert!(matches!(exporter.export_csv(), Err(ExportError::Unauthorized)));
        assert!(!session.is_valid());
        assert_eq!(notifier.count(&Notice::SessionExpired), 1);
    }

    #[test]
    fn failed_export_leaves_session_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (api, session, _, exporter) = exporter(&dir);
        api.set_readings(Err(ApiError::Transport("connection reset".into())));
        assert!(matches!(exporter.export_csv(), Err(ExportError::Network(_))));
        assert!(session.is_valid());
    }

    #[test]
    fn local_export_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, _, exporter) = exporter(&dir);
        let mut with_status = reading("2025-03-01T10:00:02", 5.0);
        with_status.status_code = Some(3);
        let export = exporter.export_local(&[with_status, reading("2025-03-01T10:00:01", 4.0)]).unwrap();

        let text = String::from_utf8(export.bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "device_id,timestamp,temperature,voltage,current,watts,status_code");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",5.0,3"));
        assert!(lines[2].ends_with(",4.0,"));
    }
}

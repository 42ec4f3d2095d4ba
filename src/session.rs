use crate::api::{Api, ApiError};
use crate::notice::{Notice, Notifier};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Lock a mutex, ignoring poisoning; every guarded value here is replaced whole
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opaque bearer token of an authenticated session
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {

    pub fn new(token: impl Into<String>) -> Credential {
        Credential(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Credential(..{} chars)", self.0.len())
    }
}

/// Login or registration did not succeed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {

    /// Refused by the server; carries its reason or a generic message
    #[error("{0}")]
    Rejected(String),

    #[error("authentication service unreachable: {0}")]
    Network(String),

    #[error("authentication service answered unexpectedly: {0}")]
    Malformed(String),
}

impl AuthError {
    fn from_api(err: ApiError, fallback: &str) -> AuthError {
        match err {
            ApiError::Status { detail, .. } =>
                AuthError::Rejected(detail.unwrap_or_else(|| fallback.to_string())),
            ApiError::Unauthorized => AuthError::Rejected(fallback.to_string()),
            ApiError::Transport(msg) => AuthError::Network(msg),
            ApiError::Malformed(msg) => AuthError::Malformed(msg),
        }
    }
}

/// What an authenticated collaborator needs from the session
pub trait SessionGate: Send + Sync {

    /// Copy of the current credential, if the session is valid
    fn credential(&self) -> Option<Credential>;

    /// Report that a request was refused as unauthorized
    fn on_unauthorized(&self);

    /// Validity of the session, updated on every transition
    fn subscribe(&self) -> watch::Receiver<bool>;

    fn is_valid(&self) -> bool {
        self.credential().is_some()
    }
}

/// The one durable slot holding the credential between runs
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {

    pub fn new(path: impl AsRef<Path>) -> CredentialFile {
        CredentialFile { path: path.as_ref().to_path_buf() }
    }

    pub fn load(&self) -> Option<Credential> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() { None } else { Some(Credential::new(token)) }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!("credential can not be read from {}: {}", self.path.display(), err);
                None
            }
        }
    }

    pub fn save(&self, credential: &Credential) {
        if let Err(err) = std::fs::write(&self.path, credential.as_str()) {
            warn!("credential can not be written to {}; \
                the session will not survive a restart ({})", self.path.display(), err);
        }
    }

    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("credential removed from {}", self.path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
            Err(err) => warn!("credential can not be removed from {}: {}", self.path.display(), err),
        }
    }
}

/// Owner of the authenticated session
pub struct SessionStore {
    api: Arc<dyn Api>,
    file: CredentialFile,
    notifier: Arc<dyn Notifier>,
    credential: Mutex<Option<Credential>>,
    validity: watch::Sender<bool>,
    invalidations: AtomicU64,
}

impl SessionStore {

    /// Create the store, restoring a persisted credential if there is one
    pub fn new(api: Arc<dyn Api>, file: CredentialFile, notifier: Arc<dyn Notifier>) -> SessionStore {
        let restored = file.load();
        if restored.is_some() {
            info!("restored credential from a previous run");
        }
        let (validity, _) = watch::channel(restored.is_some());
        SessionStore {
            api,
            file,
            notifier,
            credential: Mutex::new(restored),
            validity,
            invalidations: AtomicU64::new(0),
        }
    }

    /// How many sessions have ended so far; changes with every invalidation
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Acquire)
    }

    pub fn login(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
        let credential = self.api.token(identifier, secret)
            .map_err(|err| AuthError::from_api(err, "Authentication failed"))?;
        self.file.save(&credential);
        *lock(&self.credential) = Some(credential.clone());
        self.validity.send_replace(true);
        info!("logged in as {}", identifier);
        Ok(credential)
    }

    /// Create an account; does not log in
    pub fn register(&self, identifier: &str, secret: &str) -> Result<(), AuthError> {
        self.api.register(identifier, secret)
            .map_err(|err| AuthError::from_api(err, "Registration failed"))?;
        self.notifier.notify(&Notice::Registered);
        Ok(())
    }

    pub fn logout(&self) {
        if self.invalidate() {
            info!("logged out");
        }
    }

    /// Drop the credential; true only for the caller that saw it valid
    fn invalidate(&self) -> bool {
        let mut credential = lock(&self.credential);
        if credential.take().is_none() {
            return false;
        }
        self.invalidations.fetch_add(1, Ordering::AcqRel);
        self.file.clear();
        self.validity.send_replace(false);
        true
    }
}

impl SessionGate for SessionStore {

    fn credential(&self) -> Option<Credential> {
        lock(&self.credential).clone()
    }

    fn on_unauthorized(&self) {
        if self.invalidate() {
            warn!("credential was rejected by the server; session invalidated");
            self.notifier.notify(&Notice::SessionExpired);
        }
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.validity.subscribe()
    }
}

//! In-memory stand-in for the remote API, shared by the unit tests.

use crate::api::{Api, ApiError};
use crate::reading::Reading;
use crate::session::{lock, Credential};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeApi {
    users: Mutex<HashMap<String, String>>,
    tokens: Mutex<HashSet<String>>,
    issued: AtomicUsize,
    next_token_error: Mutex<Option<ApiError>>,
    device_keys: HashMap<String, String>,
    foreign_devices: HashSet<String>,
    claimed: Mutex<Vec<String>>,
    devices_error: Mutex<Option<ApiError>>,
    readings: Mutex<Result<Vec<Reading>, ApiError>>,
    sensor_delay: Mutex<Duration>,
    pub sensor_calls: AtomicUsize,
}

impl FakeApi {

    /// One user `ann@example.com`/`secret`; devices `dev-1`/`k1`, `dev-2`/`k2`,
    /// and `dev-9`/`k9` which belongs to somebody else
    pub fn new() -> FakeApi {
        let keys = [("dev-1", "k1"), ("dev-2", "k2"), ("dev-9", "k9")];
        FakeApi {
            users: Mutex::new(HashMap::from([("ann@example.com".to_string(), "secret".to_string())])),
            tokens: Mutex::new(HashSet::new()),
            issued: AtomicUsize::new(0),
            next_token_error: Mutex::new(None),
            device_keys: keys.iter().map(|(id, key)| (id.to_string(), key.to_string())).collect(),
            foreign_devices: HashSet::from(["dev-9".to_string()]),
            claimed: Mutex::new(Vec::new()),
            devices_error: Mutex::new(None),
            readings: Mutex::new(Ok(Vec::new())),
            sensor_delay: Mutex::new(Duration::ZERO),
            sensor_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_token(&self, err: ApiError) {
        *lock(&self.next_token_error) = Some(err);
    }

    pub fn fail_devices(&self, err: Option<ApiError>) {
        *lock(&self.devices_error) = err;
    }

    pub fn set_readings(&self, readings: Result<Vec<Reading>, ApiError>) {
        *lock(&self.readings) = readings;
    }

    pub fn set_sensor_delay(&self, delay: Duration) {
        *lock(&self.sensor_delay) = delay;
    }

    /// Invalidate every issued token, as an expiry on the server would
    pub fn revoke_tokens(&self) {
        lock(&self.tokens).clear();
    }

    fn authorize(&self, credential: &Credential) -> Result<(), ApiError> {
        if lock(&self.tokens).contains(credential.as_str()) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    fn rejected(code: u16, detail: &str) -> ApiError {
        ApiError::Status { code, detail: Some(detail.to_string()) }
    }
}

impl Api for FakeApi {

    fn register(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let mut users = lock(&self.users);
        if users.contains_key(email) {
            return Err(Self::rejected(400, "Email already exists"));
        }
        users.insert(email.to_string(), password.to_string());
        Ok(())
    }

    fn token(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        if let Some(err) = lock(&self.next_token_error).take() {
            return Err(err);
        }
        if lock(&self.users).get(username).map(String::as_str) != Some(password) {
            return Err(Self::rejected(400, "Invalid credentials"));
        }
        let token = format!("token-{}", self.issued.fetch_add(1, Ordering::SeqCst));
        lock(&self.tokens).insert(token.clone());
        Ok(Credential::new(token))
    }

    fn devices(&self, credential: &Credential) -> Result<Vec<String>, ApiError> {
        self.authorize(credential)?;
        if let Some(err) = lock(&self.devices_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.claimed).clone())
    }

    fn claim(&self, credential: &Credential, device_id: &str, device_key: &str) -> Result<(), ApiError> {
        self.authorize(credential)?;
        if self.device_keys.get(device_id).map(String::as_str) != Some(device_key) {
            return Err(Self::rejected(400, "Invalid device ID or key"));
        }
        if self.foreign_devices.contains(device_id) {
            return Err(Self::rejected(409, "Device already claimed"));
        }
        let mut claimed = lock(&self.claimed);
        if !claimed.iter().any(|id| id == device_id) {
            claimed.push(device_id.to_string());
        }
        Ok(())
    }

    fn unclaim(&self, credential: &Credential, device_id: &str) -> Result<(), ApiError> {
        self.authorize(credential)?;
        let mut claimed = lock(&self.claimed);
        match claimed.iter().position(|id| id == device_id) {
            Some(index) => {
                claimed.remove(index);
                Ok(())
            }
            None => Err(Self::rejected(404, "Device not claimed")),
        }
    }

    fn sensor_data(&self, credential: &Credential) -> Result<Vec<Reading>, ApiError> {
        self.sensor_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.sensor_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.authorize(credential)?;
        lock(&self.readings).clone()
    }

    fn sensor_data_csv(&self, credential: &Credential) -> Result<Vec<u8>, ApiError> {
        self.authorize(credential)?;
        let readings = lock(&self.readings).clone()?;
        let mut csv = String::from("device_id,timestamp,temperature,voltage,current,watts\n");
        for r in readings {
            csv.push_str(&format!("{},{},{},{},{},{}\n",
                r.device_id, r.timestamp, r.temperature, r.voltage, r.current, r.watts));
        }
        Ok(csv.into_bytes())
    }
}

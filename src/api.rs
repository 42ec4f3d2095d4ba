use crate::reading::Reading;
use crate::session::Credential;
use log::{debug, warn};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

/// Failure of one call against the remote API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {

    /// The bearer credential was missing, expired or revoked (HTTP 401)
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status, with the server's `detail` if it sent one
    #[error("server responded with HTTP status {code}")]
    Status { code: u16, detail: Option<String> },

    /// No response: DNS, connect, TLS or timeout failures
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response did not have the expected grammar
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {

    /// Server-supplied reason text, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// The remote operations the client consumes.
///
/// Calls block until the server answers or the transport gives up.
pub trait Api: Send + Sync {

    fn register(&self, email: &str, password: &str) -> Result<(), ApiError>;

    /// Exchange user name and password for a bearer token
    fn token(&self, username: &str, password: &str) -> Result<Credential, ApiError>;

    /// Identifiers of the devices claimed by the credential's owner
    fn devices(&self, credential: &Credential) -> Result<Vec<String>, ApiError>;

    fn claim(&self, credential: &Credential, device_id: &str, device_key: &str) -> Result<(), ApiError>;

    fn unclaim(&self, credential: &Credential, device_id: &str) -> Result<(), ApiError>;

    /// Most recent readings of all claimed devices, newest first
    fn sensor_data(&self, credential: &Credential) -> Result<Vec<Reading>, ApiError>;

    /// The reading history rendered as CSV by the server
    fn sensor_data_csv(&self, credential: &Credential) -> Result<Vec<u8>, ApiError>;
}

/// Response of `POST /token`
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// `Api` over HTTP
pub struct HttpApi {

    /// Base URL, without a trailing slash
    base_url: String,

    agent: ureq::Agent,
}

impl HttpApi {

    pub fn new(base_url: &str, network_timeout: Duration) -> HttpApi {
        HttpApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(network_timeout).build(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(credential: &Credential) -> String {
        format!("Bearer {}", credential.as_str())
    }

    /// Convert a ureq outcome into the API's error taxonomy
    fn check(&self, method: &str, url: &str,
        outcome: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, ApiError>
    {
        match outcome {
            Ok(response) => {
                debug!("{} {} -> {}", method, url, response.status());
                Ok(response)
            }

            Err(ureq::Error::Status(401, _)) => {
                warn!("{} {} was not authorized", method, url);
                Err(ApiError::Unauthorized)
            }

            Err(ureq::Error::Status(status, response)) => {
                let status_text = response.status_text().to_string();
                let detail = response.into_json::<serde_json::Value>().ok()
                    .and_then(|body| body.get("detail")?.as_str().map(str::to_string));
                warn!("{} {} responded with HTTP status {} {} ({})",
                    method, url, status, status_text, detail.as_deref().unwrap_or("no detail"));
                Err(ApiError::Status { code: status, detail })
            }

            Err(ureq::Error::Transport(err)) => {
                warn!("{} {} not connected ({})", method, url, err);
                Err(ApiError::Transport(err.to_string()))
            }
        }
    }
}

impl Api for HttpApi {

    fn register(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let url = self.url("/register");
        let outcome = self.agent.post(&url)
            .send_json(serde_json::json!({ "email": email, "password": password }));
        self.check("POST", &url, outcome).map(|_| ())
    }

    fn token(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let url = self.url("/token");
        let outcome = self.agent.post(&url)
            .send_form(&[("username", username), ("password", password)]);
        let response = self.check("POST", &url, outcome)?;
        let body: TokenResponse = response.into_json()
            .map_err(|err| ApiError::Malformed(format!("{} returned no access token: {}", url, err)))?;
        Ok(Credential::new(body.access_token))
    }

    fn devices(&self, credential: &Credential) -> Result<Vec<String>, ApiError> {
        let url = self.url("/devices");
        let outcome = self.agent.get(&url)
            .set("Authorization", &Self::bearer(credential))
            .call();
        self.check("GET", &url, outcome)?
            .into_json()
            .map_err(|err| ApiError::Malformed(format!("{} did not return a list of ids: {}", url, err)))
    }

    fn claim(&self, credential: &Credential, device_id: &str, device_key: &str) -> Result<(), ApiError> {
        let url = self.url("/claim");
        let outcome = self.agent.post(&url)
            .set("Authorization", &Self::bearer(credential))
            .send_json(serde_json::json!({ "device_id": device_id, "device_key": device_key }));
        self.check("POST", &url, outcome).map(|_| ())
    }

    fn unclaim(&self, credential: &Credential, device_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/unclaim/{}", device_id));
        let outcome = self.agent.delete(&url)
            .set("Authorization", &Self::bearer(credential))
            .call();
        self.check("DELETE", &url, outcome).map(|_| ())
    }

    fn sensor_data(&self, credential: &Credential) -> Result<Vec<Reading>, ApiError> {
        let url = self.url("/sensor_data");
        let outcome = self.agent.get(&url)
            .set("Authorization", &Self::bearer(credential))
            .call();
        let readings: Vec<Reading> = self.check("GET", &url, outcome)?
            .into_json()
            .map_err(|err| ApiError::Malformed(format!(
                "{} did not return JSON with the expected grammar: {}", url, err)))?;
        debug!("{} returned {} readings", url, readings.len());
        Ok(readings)
    }

    fn sensor_data_csv(&self, credential: &Credential) -> Result<Vec<u8>, ApiError> {
        let url = self.url("/sensor_data");
        let outcome = self.agent.get(&url)
            .query("format", "csv")
            .set("Authorization", &Self::bearer(credential))
            .call();
        let mut bytes = Vec::new();
        self.check("GET", &url, outcome)?
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        debug!("{} returned {} bytes of CSV", url, bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let api = HttpApi::new("https://bernt.xyz/api/", Duration::from_secs(1));
        assert_eq!(api.url("/devices"), "https://bernt.xyz/api/devices");
    }

    #[test]
    fn only_status_errors_carry_detail() {
        let rejected = ApiError::Status { code: 400, detail: Some("Invalid credentials".into()) };
        assert_eq!(rejected.detail(), Some("Invalid credentials"));
        assert_eq!(ApiError::Unauthorized.detail(), None);
        assert_eq!(ApiError::Transport("timed out".into()).detail(), None);
    }
}

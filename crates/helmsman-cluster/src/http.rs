use crate::{ClusterError, ConfigStore};
use std::io::Read;
use tracing::debug;

/// HTTP-backed Config Store speaking the cluster daemon's REST API:
///
/// - `GET    /1.0/config/<key>` — read a value (404 when absent)
/// - `PUT    /1.0/config/<key>` — write a value (whole-value overwrite)
/// - `DELETE /1.0/config/<key>` — remove a value (404 when absent)
///
/// Transport failures surface as `Unavailable`, never as `NotFound`.
pub struct HttpStore {
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth_token: None,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    fn url(&self, key: &str) -> String {
        format!("{}/1.0/config/{key}", self.base_url)
    }
}

impl ConfigStore for HttpStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, ClusterError> {
        let url = self.url(key);
        debug!("GET {url}");
        let mut req = self.agent.get(&url);
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(ClusterError::NotFound(key.to_owned()));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(ClusterError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => {
                return Err(ClusterError::Unavailable(e.to_string()));
            }
        };

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| ClusterError::Http(e.to_string()))?;
        Ok(body)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ClusterError> {
        let url = self.url(key);
        debug!("PUT {url} ({} bytes)", value.len());
        let mut req = self
            .agent
            .put(&url)
            .header("Content-Type", "application/octet-stream");
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        match req.send(value) {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(code)) => {
                Err(ClusterError::Http(format!("HTTP {code} for {url}")))
            }
            Err(e) => Err(ClusterError::Unavailable(e.to_string())),
        }
    }

    fn delete(&self, key: &str) -> Result<(), ClusterError> {
        let url = self.url(key);
        debug!("DELETE {url}");
        let mut req = self.agent.delete(&url);
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        match req.call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(404)) => Err(ClusterError::NotFound(key.to_owned())),
            Err(ureq::Error::StatusCode(code)) => {
                Err(ClusterError::Http(format!("HTTP {code} for {url}")))
            }
            Err(e) => Err(ClusterError::Unavailable(e.to_string())),
        }
    }
}

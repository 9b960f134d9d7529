//! HTTP client setup shared by the HTTP-based backends
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{DiscoveryError, DiscoveryResult};
use std::time::Duration;

const USER_AGENT: &str = concat!("keyfinder/", env!("CARGO_PKG_VERSION"));

/// Validated endpoint and client for one HTTP backend
pub(crate) struct HttpEndpoint {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl HttpEndpoint {
    /// Validate the configured endpoint and build a client bounded by `timeout`
    pub fn new(backend: &str, url: Option<&str>, timeout: Duration) -> DiscoveryResult<Self> {
        let url = url.map(str::trim).filter(|u| !u.is_empty()).ok_or_else(|| {
            DiscoveryError::ConfigurationError(format!("{}: missing required parameter 'url'", backend))
        })?;

        reqwest::Url::parse(url).map_err(|e| {
            DiscoveryError::ConfigurationError(format!("{}: invalid url '{}': {}", backend, url, e))
        })?;

        if timeout.is_zero() {
            return Err(DiscoveryError::ConfigurationError(format!(
                "{}: timeout_secs must be greater than zero",
                backend
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                DiscoveryError::ConfigurationError(format!("{}: failed to build HTTP client: {}", backend, e))
            })?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url() {
        let result = HttpEndpoint::new("hkp", None, Duration::from_secs(5));
        assert!(matches!(result, Err(DiscoveryError::ConfigurationError(msg)) if msg.contains("url")));

        let result = HttpEndpoint::new("hkp", Some("  "), Duration::from_secs(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_url() {
        let result = HttpEndpoint::new("keybase", Some("not a url"), Duration::from_secs(5));
        assert!(matches!(result, Err(DiscoveryError::ConfigurationError(_))));
    }

    #[test]
    fn test_zero_timeout() {
        let result = HttpEndpoint::new("hkp", Some("https://keys.example.org"), Duration::ZERO);
        assert!(matches!(result, Err(DiscoveryError::ConfigurationError(msg)) if msg.contains("timeout")));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let endpoint =
            HttpEndpoint::new("hkp", Some("https://keys.example.org/"), Duration::from_secs(5)).unwrap();
        assert_eq!(endpoint.base_url, "https://keys.example.org");
    }
}

//! Error types for key discovery
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


use std::time::Duration;
use thiserror::Error;

/// Errors raised while building the discovery subsystem.
///
/// These never surface from a lookup.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Unknown identifier type: {0}")]
    UnknownIdentifierType(String),
}

/// Fault raised by one backend during one lookup.
///
/// Always absorbed by the discoverer.
#[derive(Error, Debug)]
pub enum BackendFault {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled by the lookup deadline")]
    Cancelled,

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Lookup task failed: {0}")]
    TaskFailed(String),
}

impl BackendFault {
    /// Map an HTTP client error, reporting client-side timeouts as such
    pub(crate) fn from_http(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendFault::Timeout(timeout)
        } else {
            BackendFault::HttpError(err)
        }
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
pub type BackendResult<T> = Result<T, BackendFault>;

//! Keybase-style directory discovery
//!
//! Resolves directory usernames and proven social handles through the
//! `user/lookup.json` API and returns each user's primary public key.
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


use crate::client::HttpEndpoint;
use crate::error::{BackendFault, BackendResult, DiscoveryResult};
use crate::traits::{BackendKind, Identifier, IdentifierType, KeyBackend, KeyRecord, LookupResult};
use async_trait::async_trait;
use keyfinder_config::KeybaseConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const CAPABILITIES: &[IdentifierType] = &[
    IdentifierType::Keybase,
    IdentifierType::Twitter,
    IdentifierType::Github,
    IdentifierType::Reddit,
    IdentifierType::Hackernews,
];

const LOOKUP_PATH: &str = "/_/api/1.0/user/lookup.json";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: ApiStatus,
    #[serde(default)]
    them: Option<Vec<Option<DirectoryUser>>>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryUser {
    #[serde(default)]
    basics: Option<Basics>,
    #[serde(default)]
    public_keys: Option<PublicKeys>,
}

#[derive(Debug, Deserialize)]
struct Basics {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicKeys {
    primary: Option<PrimaryKey>,
}

#[derive(Debug, Deserialize)]
struct PrimaryKey {
    kid: Option<String>,
    key_fingerprint: Option<String>,
    bundle: Option<String>,
}

/// Query parameter the directory expects for an identifier type
fn query_field(kind: IdentifierType) -> &'static str {
    match kind {
        IdentifierType::Keybase => "usernames",
        other => other.as_str(),
    }
}

fn user_key(user: DirectoryUser) -> Option<KeyRecord> {
    let primary = user.public_keys?.primary?;
    let bundle = primary.bundle.filter(|b| !b.trim().is_empty())?;

    let mut key = KeyRecord::armored(bundle.trim());
    if let Some(fingerprint) = &primary.key_fingerprint {
        key = key.with_fingerprint(fingerprint);
    }
    if let Some(kid) = primary.kid {
        key = key.with_metadata("kid", kid);
    }
    if let Some(username) = user.basics.and_then(|b| b.username) {
        key = key.with_metadata("username", username);
    }
    Some(key)
}

/// Keybase-style directory backend
pub struct KeybaseBackend {
    endpoint: HttpEndpoint,
    timeout: Duration,
}

impl KeybaseBackend {
    pub fn new(config: &KeybaseConfig) -> DiscoveryResult<Self> {
        let timeout = config.timeout();
        Ok(Self {
            endpoint: HttpEndpoint::new("keybase", config.url.as_deref(), timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl KeyBackend for KeybaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Keybase
    }

    fn capabilities(&self) -> &'static [IdentifierType] {
        CAPABILITIES
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, identifier: &Identifier) -> BackendResult<LookupResult> {
        let handle = identifier.value();
        if handle.is_empty() || handle.contains(',') {
            return Err(BackendFault::InvalidIdentifier(format!(
                "not a single handle: '{}'",
                handle
            )));
        }

        let url = format!("{}{}", self.endpoint.base_url, LOOKUP_PATH);
        let response = self
            .endpoint
            .client
            .get(&url)
            .query(&[
                (query_field(identifier.kind()), handle),
                ("fields", "basics,public_keys"),
            ])
            .send()
            .await
            .map_err(|e| BackendFault::from_http(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendFault::from_http(e, self.timeout))?;

        // Not-found answers may come with a non-2xx status and a JSON body
        let parsed: LookupResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(BackendFault::ProtocolError(format!(
                    "Keybase API error ({}): {}",
                    status, body
                )))
            }
        };

        if parsed.status.code != 0 {
            if parsed.status.name == "NOT_FOUND" {
                debug!(handle, "Directory has no such user");
                return Ok(LookupResult::empty(BackendKind::Keybase));
            }
            return Err(BackendFault::ProtocolError(format!(
                "Keybase API status {} {}: {}",
                parsed.status.code,
                parsed.status.name,
                parsed.status.desc.unwrap_or_default()
            )));
        }

        let keys: Vec<KeyRecord> = parsed
            .them
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(user_key)
            .collect();

        Ok(LookupResult::new(BackendKind::Keybase, keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> LookupResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_query_field() {
        assert_eq!(query_field(IdentifierType::Keybase), "usernames");
        assert_eq!(query_field(IdentifierType::Github), "github");
        assert_eq!(query_field(IdentifierType::Hackernews), "hackernews");
    }

    #[test]
    fn test_user_key_from_response() {
        let response = decode(
            r#"{
                "status": {"code": 0, "name": "OK"},
                "them": [{
                    "id": "abc",
                    "basics": {"username": "alice"},
                    "public_keys": {"primary": {
                        "kid": "0101aa",
                        "key_fingerprint": "aaaa1111bbbb2222",
                        "bundle": "-----BEGIN PGP PUBLIC KEY BLOCK-----\n...\n"
                    }}
                }, null]
            }"#,
        );
        assert_eq!(response.status.code, 0);

        let keys: Vec<KeyRecord> = response
            .them
            .unwrap()
            .into_iter()
            .flatten()
            .filter_map(user_key)
            .collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].fingerprint.as_deref(), Some("AAAA1111BBBB2222"));
        assert_eq!(keys[0].metadata.get("username").map(String::as_str), Some("alice"));
        assert_eq!(keys[0].metadata.get("kid").map(String::as_str), Some("0101aa"));
    }

    #[test]
    fn test_user_without_primary_key() {
        let response = decode(
            r#"{"status": {"code": 0, "name": "OK"},
                "them": [{"basics": {"username": "bob"}, "public_keys": {"primary": null}}]}"#,
        );
        let keys: Vec<KeyRecord> = response
            .them
            .unwrap()
            .into_iter()
            .flatten()
            .filter_map(user_key)
            .collect();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_not_found_status() {
        let response = decode(r#"{"status": {"code": 205, "name": "NOT_FOUND", "desc": "nope"}}"#);
        assert_eq!(response.status.name, "NOT_FOUND");
        assert!(response.them.is_none());
    }
}

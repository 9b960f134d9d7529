//! HKP keyserver discovery
//!
//! Uses the machine-readable index (`op=index&options=mr`) to list
//! candidate keys, then fetches each usable key with `op=get`.
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
use crate::error::{BackendFault, BackendResult, DiscoveryError, DiscoveryResult};
use crate::traits::{BackendKind, Identifier, IdentifierType, KeyBackend, KeyRecord, LookupResult};
use async_trait::async_trait;
use keyfinder_config::HkpConfig;
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

const CAPABILITIES: &[IdentifierType] = &[IdentifierType::Email, IdentifierType::Fingerprint];

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// One `pub:` entry of a machine-readable index, with its `uid:` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key_id: String,
    pub algorithm: Option<String>,
    pub key_length: Option<String>,
    pub created: Option<i64>,
    pub expires: Option<i64>,
    pub flags: String,
    pub uids: Vec<String>,
}

impl IndexEntry {
    pub fn is_revoked(&self) -> bool {
        self.flags.contains('r')
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains('d')
    }

    /// Expired by flag or by expiration date relative to `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.flags.contains('e') || self.expires.is_some_and(|expires| expires <= now)
    }

    pub fn is_usable(&self, now: i64) -> bool {
        !self.is_revoked() && !self.is_disabled() && !self.is_expired(now)
    }
}

fn optional_field(field: Option<&str>) -> Option<String> {
    field.filter(|f| !f.is_empty()).map(str::to_string)
}

fn timestamp_field(field: Option<&str>, line: &str) -> BackendResult<Option<i64>> {
    match field.filter(|f| !f.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            BackendFault::InvalidResponse(format!("bad timestamp in index line '{}'", line))
        }),
    }
}

/// Fields after the `pub` tag: key id, algorithm, length, created, expires, flags
const PUB_FIELDS: usize = 6;

/// Parse a machine-readable HKP index
pub fn parse_index(body: &str) -> BackendResult<Vec<IndexEntry>> {
    let mut entries: Vec<IndexEntry> = Vec::new();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = line.split(':');
        match fields.next() {
            Some("pub") => {
                let fields: Vec<&str> = fields.collect();
                if fields.len() < PUB_FIELDS {
                    return Err(BackendFault::InvalidResponse(format!(
                        "truncated index line: '{}'",
                        line
                    )));
                }
                if fields[0].is_empty() {
                    return Err(BackendFault::InvalidResponse(format!(
                        "index line without key id: '{}'",
                        line
                    )));
                }
                entries.push(IndexEntry {
                    key_id: fields[0].to_string(),
                    algorithm: optional_field(Some(fields[1])),
                    key_length: optional_field(Some(fields[2])),
                    created: timestamp_field(Some(fields[3]), line)?,
                    expires: timestamp_field(Some(fields[4]), line)?,
                    flags: fields[5].to_string(),
                    uids: Vec::new(),
                });
            }
            Some("uid") => {
                // uid lines before any pub line carry no key to attach to
                if let (Some(entry), Some(uid)) = (entries.last_mut(), fields.next()) {
                    entry.uids.push(percent_decode_str(uid).decode_utf8_lossy().into_owned());
                }
            }
            // info: header and unknown record types
            _ => {}
        }
    }

    Ok(entries)
}

/// HKP search string for an identifier
fn search_term(identifier: &Identifier) -> BackendResult<String> {
    match identifier.kind() {
        IdentifierType::Email => {
            if identifier.value().contains('@') {
                Ok(identifier.value().to_string())
            } else {
                Err(BackendFault::InvalidIdentifier(format!(
                    "not an email address: {}",
                    identifier.value()
                )))
            }
        }
        IdentifierType::Fingerprint => {
            let hex: String = identifier
                .value()
                .strip_prefix("0x")
                .or_else(|| identifier.value().strip_prefix("0X"))
                .unwrap_or(identifier.value())
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BackendFault::InvalidIdentifier(format!(
                    "not a hex fingerprint: {}",
                    identifier.value()
                )));
            }
            Ok(format!("0x{}", hex.to_ascii_uppercase()))
        }
        other => Err(BackendFault::InvalidIdentifier(format!(
            "hkp cannot search {} identifiers",
            other
        ))),
    }
}

/// HKP keyserver backend
pub struct HkpBackend {
    endpoint: HttpEndpoint,
    timeout: Duration,
    max_keys: usize,
}

impl HkpBackend {
    pub fn new(config: &HkpConfig) -> DiscoveryResult<Self> {
        if config.max_keys == 0 {
            return Err(DiscoveryError::ConfigurationError(
                "hkp: max_keys must be greater than zero".to_string(),
            ));
        }
        let timeout = config.timeout();
        Ok(Self {
            endpoint: HttpEndpoint::new("hkp", config.url.as_deref(), timeout)?,
            timeout,
            max_keys: config.max_keys,
        })
    }

    fn lookup_url(&self) -> String {
        format!("{}/pks/lookup", self.endpoint.base_url)
    }

    /// Issue one `/pks/lookup` request; `None` when the server has no match
    async fn request(&self, op: &str, search: &str) -> BackendResult<Option<String>> {
        let response = self
            .endpoint
            .client
            .get(self.lookup_url())
            .query(&[("op", op), ("options", "mr"), ("search", search)])
            .send()
            .await
            .map_err(|e| BackendFault::from_http(e, self.timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendFault::ProtocolError(format!(
                "HKP {} request failed ({}): {}",
                op, status, error_text
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendFault::from_http(e, self.timeout))?;
        Ok(Some(body))
    }

    async fn fetch_key(&self, entry: &IndexEntry) -> BackendResult<Option<KeyRecord>> {
        let search = format!("0x{}", entry.key_id.to_ascii_uppercase());
        let Some(armored) = self.request("get", &search).await? else {
            warn!(key_id = %entry.key_id, "Indexed key missing from keyserver");
            return Ok(None);
        };

        if !armored.contains(ARMOR_HEADER) {
            return Err(BackendFault::InvalidResponse(format!(
                "no armored key returned for {}",
                search
            )));
        }

        let mut key = KeyRecord::armored(armored.trim()).with_fingerprint(&entry.key_id);
        if let Some(algorithm) = &entry.algorithm {
            key = key.with_metadata("algorithm", algorithm.as_str());
        }
        if let Some(key_length) = &entry.key_length {
            key = key.with_metadata("key_length", key_length.as_str());
        }
        if let Some(created) = entry.created {
            key = key.with_metadata("created", created.to_string());
        }
        if let Some(expires) = entry.expires {
            key = key.with_metadata("expires", expires.to_string());
        }
        if !entry.uids.is_empty() {
            key = key.with_metadata("uids", entry.uids.join("\n"));
        }
        Ok(Some(key))
    }
}

#[async_trait]
impl KeyBackend for HkpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hkp
    }

    fn capabilities(&self) -> &'static [IdentifierType] {
        CAPABILITIES
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, identifier: &Identifier) -> BackendResult<LookupResult> {
        let search = search_term(identifier)?;

        let Some(index) = self.request("index", &search).await? else {
            debug!(search = %search, "Keyserver has no matching keys");
            return Ok(LookupResult::empty(BackendKind::Hkp));
        };

        let now = chrono::Utc::now().timestamp();
        let entries = parse_index(&index)?;
        let total = entries.len();
        let usable: Vec<IndexEntry> = entries
            .into_iter()
            .filter(|entry| entry.is_usable(now))
            .take(self.max_keys)
            .collect();

        debug!(
            search = %search,
            indexed = total,
            fetching = usable.len(),
            "Keyserver index retrieved"
        );

        let mut keys = Vec::with_capacity(usable.len());
        for entry in &usable {
            if let Some(key) = self.fetch_key(entry).await? {
                keys.push(key);
            }
        }

        Ok(LookupResult::new(BackendKind::Hkp, keys))
    }
}

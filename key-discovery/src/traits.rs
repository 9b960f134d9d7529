//! Trait and data definitions shared by discovery backends
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


use crate::error::{BackendResult, DiscoveryError};
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifier type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    Email,
    Fingerprint,
    /// Directory username
    Keybase,
    Twitter,
    Github,
    Reddit,
    Hackernews,
    Xmpp,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Email => "email",
            IdentifierType::Fingerprint => "fingerprint",
            IdentifierType::Keybase => "keybase",
            IdentifierType::Twitter => "twitter",
            IdentifierType::Github => "github",
            IdentifierType::Reddit => "reddit",
            IdentifierType::Hackernews => "hackernews",
            IdentifierType::Xmpp => "xmpp",
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierType {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(IdentifierType::Email),
            "fingerprint" => Ok(IdentifierType::Fingerprint),
            "keybase" => Ok(IdentifierType::Keybase),
            "twitter" => Ok(IdentifierType::Twitter),
            "github" => Ok(IdentifierType::Github),
            "reddit" => Ok(IdentifierType::Reddit),
            "hackernews" => Ok(IdentifierType::Hackernews),
            "xmpp" => Ok(IdentifierType::Xmpp),
            other => Err(DiscoveryError::UnknownIdentifierType(other.to_string())),
        }
    }
}

/// A contact identifier to look keys up for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    value: String,
    kind: IdentifierType,
}

impl Identifier {
    pub fn new(value: impl Into<String>, kind: IdentifierType) -> Self {
        let value = value.into();
        Self {
            value: value.trim().to_string(),
            kind,
        }
    }

    /// Parse the type tag and build an identifier
    pub fn parse(value: &str, kind: &str) -> Result<Self, DiscoveryError> {
        Ok(Self::new(value, kind.parse()?))
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> IdentifierType {
        self.kind
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Backend kinds known at compile time.
///
/// The ordering is the registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dns,
    Keybase,
    Hkp,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Dns, BackendKind::Keybase, BackendKind::Hkp];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Dns => "dns",
            BackendKind::Keybase => "keybase",
            BackendKind::Hkp => "hkp",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key material as reported by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum KeyMaterial {
    /// Raw transferable public key bytes
    Binary(#[serde(serialize_with = "hex::serde::serialize")] Vec<u8>),
    /// ASCII-armored public key block
    Armored(String),
}

impl KeyMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KeyMaterial::Binary(bytes) => bytes,
            KeyMaterial::Armored(text) => text.as_bytes(),
        }
    }
}

/// A discovered public key.
///
/// Opaque to the discoverer: it is never parsed or validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    pub material: KeyMaterial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl KeyRecord {
    pub fn binary(bytes: Vec<u8>) -> Self {
        Self::new(KeyMaterial::Binary(bytes))
    }

    pub fn armored(text: impl Into<String>) -> Self {
        Self::new(KeyMaterial::Armored(text.into()))
    }

    fn new(material: KeyMaterial) -> Self {
        Self {
            material,
            fingerprint: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the fingerprint, normalized to upper-case hex without spaces
    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        let compact: String = fingerprint.chars().filter(|c| !c.is_whitespace()).collect();
        let normalized = compact
            .strip_prefix("0x")
            .or_else(|| compact.strip_prefix("0X"))
            .unwrap_or(&compact)
            .to_ascii_uppercase();
        if !normalized.is_empty() {
            self.fingerprint = Some(normalized);
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity used for deduplication: the fingerprint when known,
    /// otherwise a digest of the material.
    pub fn identity(&self) -> String {
        match &self.fingerprint {
            Some(fingerprint) => fingerprint.clone(),
            None => format!("sha256:{}", hex::encode(Sha256::digest(self.material.as_bytes()))),
        }
    }
}

/// Keys found by one backend for one lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    pub backend: BackendKind,
    keys: Vec<KeyRecord>,
}

impl LookupResult {
    /// Build a result, dropping keys whose identity was already seen
    pub fn new(backend: BackendKind, keys: Vec<KeyRecord>) -> Self {
        Self {
            backend,
            keys: dedup_keys(keys),
        }
    }

    pub fn empty(backend: BackendKind) -> Self {
        Self {
            backend,
            keys: Vec::new(),
        }
    }

    pub fn keys(&self) -> &[KeyRecord] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<KeyRecord> {
        self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Remove keys with duplicate identities, keeping first occurrences in order
pub(crate) fn dedup_keys(keys: impl IntoIterator<Item = KeyRecord>) -> Vec<KeyRecord> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(key.identity()))
        .collect()
}

/// Trait for public-key directory backends
#[async_trait]
pub trait KeyBackend: Send + Sync {
    /// Backend kind, unique within a registry
    fn kind(&self) -> BackendKind;

    /// Canonical backend name
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Identifier types this backend can resolve
    fn capabilities(&self) -> &'static [IdentifierType];

    fn supports(&self, kind: IdentifierType) -> bool {
        self.capabilities().contains(&kind)
    }

    /// Upper bound for a single lookup
    fn timeout(&self) -> Duration;

    /// Look up keys for an identifier whose type is in `capabilities()`
    async fn lookup(&self, identifier: &Identifier) -> BackendResult<LookupResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_type_round_trip() {
        for kind in [
            IdentifierType::Email,
            IdentifierType::Fingerprint,
            IdentifierType::Keybase,
            IdentifierType::Hackernews,
        ] {
            assert_eq!(kind.as_str().parse::<IdentifierType>().unwrap(), kind);
        }
        assert_eq!(" EMAIL ".parse::<IdentifierType>().unwrap(), IdentifierType::Email);
    }

    #[test]
    fn test_unknown_identifier_type() {
        let result = "carrier-pigeon".parse::<IdentifierType>();
        assert!(matches!(result, Err(DiscoveryError::UnknownIdentifierType(t)) if t == "carrier-pigeon"));
    }

    #[test]
    fn test_identifier_is_trimmed() {
        let identifier = Identifier::parse("  alice@example.org ", "email").unwrap();
        assert_eq!(identifier.value(), "alice@example.org");
        assert_eq!(identifier.kind(), IdentifierType::Email);
        assert_eq!(identifier.to_string(), "email:alice@example.org");
    }

    #[test]
    fn test_fingerprint_normalization() {
        let key = KeyRecord::armored("block").with_fingerprint("0xabcd ef01");
        assert_eq!(key.fingerprint.as_deref(), Some("ABCDEF01"));
        assert_eq!(key.identity(), "ABCDEF01");

        let upper = KeyRecord::armored("other").with_fingerprint("0XABCDEF01");
        assert_eq!(upper.identity(), key.identity());
    }

    #[test]
    fn test_identity_falls_back_to_digest() {
        let a = KeyRecord::binary(vec![1, 2, 3]);
        let b = KeyRecord::binary(vec![1, 2, 3]).with_metadata("source", "other");
        let c = KeyRecord::binary(vec![4, 5, 6]);
        assert!(a.identity().starts_with("sha256:"));
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_lookup_result_dedups_by_identity() {
        let keys = vec![
            KeyRecord::armored("first").with_fingerprint("AAAA"),
            KeyRecord::armored("second").with_fingerprint("BBBB"),
            KeyRecord::armored("third").with_fingerprint("aaaa"),
        ];
        let result = LookupResult::new(BackendKind::Hkp, keys);
        assert_eq!(result.len(), 2);
        assert_eq!(result.keys()[0].material, KeyMaterial::Armored("first".to_string()));
        assert_eq!(result.keys()[1].fingerprint.as_deref(), Some("BBBB"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["keys"].as_array().map(Vec::len), Some(2));
        assert_eq!(result.into_keys().len(), 2);
    }

    #[test]
    fn test_key_record_serialization() {
        let key = KeyRecord::binary(vec![0xde, 0xad]);
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["material"]["format"], "binary");
        assert_eq!(json["material"]["data"], "dead");
        assert!(json.get("fingerprint").is_none());
    }

    #[test]
    fn test_backend_kind_order() {
        let mut kinds = vec![BackendKind::Hkp, BackendKind::Dns, BackendKind::Keybase];
        kinds.sort();
        assert_eq!(kinds, BackendKind::ALL.to_vec());
    }
}

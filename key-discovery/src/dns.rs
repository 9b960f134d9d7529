//! DNS key discovery (RFC 7929 OPENPGPKEY records)
//!
//! The owner name of a user's key is the SHA-256 digest of the local part,
//! truncated to 28 octets and hex encoded, under `_openpgpkey.<domain>`.
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


use crate::error::{BackendFault, BackendResult, DiscoveryError, DiscoveryResult};
use crate::traits::{BackendKind, Identifier, IdentifierType, KeyBackend, KeyRecord, LookupResult};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::Resolver as HickoryResolver;
use keyfinder_config::DnsConfig;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Type alias for the Tokio-based hickory resolver.
type TokioResolver = HickoryResolver<TokioConnectionProvider>;

const CAPABILITIES: &[IdentifierType] = &[IdentifierType::Email];

/// Octets of the local-part digest kept in the owner name
const HASH_OCTETS: usize = 28;

/// Compute the OPENPGPKEY owner name for an email address
pub fn openpgpkey_name(email: &str) -> BackendResult<String> {
    let (local, domain) = split_email(email)?;
    let digest = Sha256::digest(local.as_bytes());
    Ok(format!(
        "{}._openpgpkey.{}.",
        hex::encode(&digest[..HASH_OCTETS]),
        domain.trim_end_matches('.').to_ascii_lowercase()
    ))
}

fn split_email(email: &str) -> BackendResult<(&str, &str)> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok((local, domain))
        }
        _ => Err(BackendFault::InvalidIdentifier(format!(
            "not an email address: {}",
            email
        ))),
    }
}

/// Turn OPENPGPKEY record payloads into key records
pub fn records_to_keys(payloads: Vec<Vec<u8>>, owner: &str) -> Vec<KeyRecord> {
    payloads
        .into_iter()
        .filter(|payload| !payload.is_empty())
        .map(|payload| KeyRecord::binary(payload).with_metadata("dns_name", owner))
        .collect()
}

/// DNS OPENPGPKEY discovery backend
pub struct DnsBackend {
    resolver: TokioResolver,
    timeout: Duration,
}

impl DnsBackend {
    pub fn new(config: &DnsConfig) -> DiscoveryResult<Self> {
        if config.timeout_secs == 0 {
            return Err(DiscoveryError::ConfigurationError(
                "dns: timeout_secs must be greater than zero".to_string(),
            ));
        }
        let timeout = config.timeout();

        let resolver_config = match &config.nameserver {
            Some(nameserver) => {
                let ip: IpAddr = nameserver.parse().map_err(|e| {
                    DiscoveryError::ConfigurationError(format!(
                        "dns: invalid nameserver '{}': {}",
                        nameserver, e
                    ))
                })?;
                ResolverConfig::from_parts(
                    None,
                    Vec::new(),
                    NameServerConfigGroup::from_ips_clear(&[ip], 53, true),
                )
            }
            None => ResolverConfig::default(),
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;

        let resolver =
            HickoryResolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Ok(Self { resolver, timeout })
    }

    async fn query(&self, owner: &str) -> BackendResult<Vec<Vec<u8>>> {
        let lookup = match self.resolver.lookup(owner, RecordType::OPENPGPKEY).await {
            Ok(lookup) => lookup,
            Err(e) if e.is_no_records_found() || e.is_nx_domain() => {
                debug!(name = owner, "No OPENPGPKEY record");
                return Ok(Vec::new());
            }
            Err(e) => return Err(BackendFault::Dns(e.to_string())),
        };

        Ok(lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::OPENPGPKEY(key) => Some(key.public_key().to_vec()),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl KeyBackend for DnsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dns
    }

    fn capabilities(&self) -> &'static [IdentifierType] {
        CAPABILITIES
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, identifier: &Identifier) -> BackendResult<LookupResult> {
        let owner = openpgpkey_name(identifier.value())?;
        debug!(name = %owner, "Querying OPENPGPKEY record");

        let payloads = tokio::time::timeout(self.timeout, self.query(&owner))
            .await
            .map_err(|_| BackendFault::Timeout(self.timeout))??;

        Ok(LookupResult::new(BackendKind::Dns, records_to_keys(payloads, &owner)))
    }
}

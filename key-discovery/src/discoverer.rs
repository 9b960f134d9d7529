//! Key discoverer
//!
//! Fans one lookup out to every backend able to resolve the identifier
//! type, isolates each backend's faults, and aggregates the non-empty
//! results in registry order.
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


use crate::error::{BackendFault, DiscoveryError, DiscoveryResult};
use crate::registry::BackendRegistry;
use crate::traits::{dedup_keys, BackendKind, Identifier, KeyBackend, KeyRecord, LookupResult};
use keyfinder_config::KeyDiscoveryConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one backend for one lookup
#[derive(Debug)]
pub enum BackendOutcome {
    /// Completed with at least one key
    Found(LookupResult),
    /// Completed without keys
    Empty,
    /// Failed; excluded from the aggregate
    Fault(BackendFault),
}

impl BackendOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, BackendOutcome::Fault(_))
    }
}

/// One capable backend's outcome and how long it took
#[derive(Debug)]
pub struct BackendReport {
    pub backend: BackendKind,
    pub outcome: BackendOutcome,
    pub elapsed: Duration,
}

/// Every capable backend's outcome for one lookup, in registry order.
///
/// Lets callers tell "found nothing" apart from "backend failed".
#[derive(Debug)]
pub struct DiscoveryReport {
    identifier: Identifier,
    reports: Vec<BackendReport>,
}

impl DiscoveryReport {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn reports(&self) -> &[BackendReport] {
        &self.reports
    }

    /// Faulted backends with their faults
    pub fn faults(&self) -> impl Iterator<Item = (BackendKind, &BackendFault)> {
        self.reports.iter().filter_map(|report| match &report.outcome {
            BackendOutcome::Fault(fault) => Some((report.backend, fault)),
            _ => None,
        })
    }

    /// Keep only non-empty, non-faulted results
    pub fn into_aggregate(self) -> AggregateResult {
        let results = self
            .reports
            .into_iter()
            .filter_map(|report| match report.outcome {
                BackendOutcome::Found(result) => Some(result),
                _ => None,
            })
            .collect();
        AggregateResult { results }
    }
}

/// Non-empty lookup results for one call, in registry order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult {
    results: Vec<LookupResult>,
}

impl AggregateResult {
    pub fn results(&self) -> &[LookupResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<LookupResult> {
        self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Source backends, in order
    pub fn backends(&self) -> Vec<BackendKind> {
        self.results.iter().map(|result| result.backend).collect()
    }

    /// All keys deduplicated by identity; earlier sources win
    pub fn unique_keys(&self) -> Vec<KeyRecord> {
        dedup_keys(self.results.iter().flat_map(|result| result.keys().iter().cloned()))
    }
}

impl IntoIterator for AggregateResult {
    type Item = LookupResult;
    type IntoIter = std::vec::IntoIter<LookupResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Aborts the wrapped lookup task when dropped
struct TaskGuard(JoinHandle<(BackendOutcome, Duration)>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one backend under its own timeout
async fn run_backend(backend: Arc<dyn KeyBackend>, identifier: Identifier) -> (BackendOutcome, Duration) {
    let started = Instant::now();
    let timeout = backend.timeout();

    let outcome = match tokio::time::timeout(timeout, backend.lookup(&identifier)).await {
        Ok(Ok(mut result)) => {
            result.backend = backend.kind();
            if result.is_empty() {
                BackendOutcome::Empty
            } else {
                BackendOutcome::Found(result)
            }
        }
        Ok(Err(fault)) => BackendOutcome::Fault(fault),
        Err(_) => BackendOutcome::Fault(BackendFault::Timeout(timeout)),
    };

    (outcome, started.elapsed())
}

/// Discovers public keys across all registered backends
pub struct KeyDiscoverer {
    registry: Arc<BackendRegistry>,
    deadline: Duration,
}

impl KeyDiscoverer {
    /// Create a discoverer over a built registry with a caller-level deadline
    pub fn new(registry: BackendRegistry, deadline: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            deadline,
        }
    }

    /// Build the registry from configuration
    pub fn from_config(config: &KeyDiscoveryConfig) -> DiscoveryResult<Self> {
        if config.deadline_secs == 0 {
            return Err(DiscoveryError::ConfigurationError(
                "deadline_secs must be greater than zero".to_string(),
            ));
        }
        let registry = BackendRegistry::from_config(config)?;
        info!(
            backends = ?registry.kinds(),
            deadline = ?config.deadline(),
            "Key discovery initialized"
        );
        Ok(Self::new(registry, config.deadline()))
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Search public keys for an identifier and a type tag.
    ///
    /// Never fails: unknown types, missing backends and backend faults
    /// all yield an empty (or partial) result.
    pub async fn lookup_identity(&self, identifier: &str, type_: &str) -> AggregateResult {
        match Identifier::parse(identifier, type_) {
            Ok(identifier) => self.lookup(&identifier).await,
            Err(e) => {
                debug!(identifier, identifier_type = type_, error = %e, "No backend for identifier type");
                AggregateResult::default()
            }
        }
    }

    /// Search public keys for a typed identifier
    pub async fn lookup(&self, identifier: &Identifier) -> AggregateResult {
        let aggregate = self.discover(identifier).await.into_aggregate();
        info!(
            identifier = identifier.value(),
            identifier_type = %identifier.kind(),
            sources = ?aggregate.backends(),
            "Key lookup completed"
        );
        aggregate
    }

    /// Run every capable backend concurrently and report each outcome
    pub async fn discover(&self, identifier: &Identifier) -> DiscoveryReport {
        let candidates = self.registry.backends_supporting(identifier.kind());
        if candidates.is_empty() {
            debug!(
                identifier = identifier.value(),
                identifier_type = %identifier.kind(),
                "No backend supports identifier type"
            );
            return DiscoveryReport {
                identifier: identifier.clone(),
                reports: Vec::new(),
            };
        }

        let started = Instant::now();
        let deadline = started + self.deadline;

        let tasks: Vec<(BackendKind, TaskGuard)> = candidates
            .into_iter()
            .map(|backend| {
                let kind = backend.kind();
                let handle = tokio::spawn(run_backend(backend, identifier.clone()));
                (kind, TaskGuard(handle))
            })
            .collect();

        // Tasks run concurrently; joining in registry order keeps output stable
        let mut reports = Vec::with_capacity(tasks.len());
        for (backend, mut task) in tasks {
            let (outcome, elapsed) = match tokio::time::timeout_at(deadline, &mut task.0).await {
                Ok(Ok(completed)) => completed,
                Ok(Err(e)) => (
                    BackendOutcome::Fault(BackendFault::TaskFailed(e.to_string())),
                    started.elapsed(),
                ),
                Err(_) => (BackendOutcome::Fault(BackendFault::Cancelled), started.elapsed()),
            };
            // Dropping the guard aborts a task cut off by the deadline
            drop(task);

            log_outcome(backend, identifier, &outcome, elapsed);
            reports.push(BackendReport {
                backend,
                outcome,
                elapsed,
            });
        }

        DiscoveryReport {
            identifier: identifier.clone(),
            reports,
        }
    }
}

fn log_outcome(backend: BackendKind, identifier: &Identifier, outcome: &BackendOutcome, elapsed: Duration) {
    match outcome {
        BackendOutcome::Found(result) => debug!(
            backend = backend.name(),
            identifier = identifier.value(),
            keys = result.len(),
            elapsed = ?elapsed,
            "Keys found"
        ),
        BackendOutcome::Empty => debug!(
            backend = backend.name(),
            identifier = identifier.value(),
            elapsed = ?elapsed,
            "No keys found"
        ),
        BackendOutcome::Fault(fault) => warn!(
            backend = backend.name(),
            identifier = identifier.value(),
            identifier_type = %identifier.kind(),
            error = %fault,
            elapsed = ?elapsed,
            "Key lookup failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{IdentifierType, KeyMaterial};

    fn result(backend: BackendKind, fingerprints: &[&str]) -> LookupResult {
        LookupResult::new(
            backend,
            fingerprints
                .iter()
                .map(|f| KeyRecord::armored(format!("key {}", f)).with_fingerprint(f))
                .collect(),
        )
    }

    #[test]
    fn test_into_aggregate_filters_and_keeps_order() {
        let report = DiscoveryReport {
            identifier: Identifier::new("alice@example.org", IdentifierType::Email),
            reports: vec![
                BackendReport {
                    backend: BackendKind::Dns,
                    outcome: BackendOutcome::Found(result(BackendKind::Dns, &["AA"])),
                    elapsed: Duration::ZERO,
                },
                BackendReport {
                    backend: BackendKind::Keybase,
                    outcome: BackendOutcome::Fault(BackendFault::Cancelled),
                    elapsed: Duration::ZERO,
                },
                BackendReport {
                    backend: BackendKind::Hkp,
                    outcome: BackendOutcome::Empty,
                    elapsed: Duration::ZERO,
                },
            ],
        };

        assert_eq!(report.faults().count(), 1);
        let aggregate = report.into_aggregate();
        assert_eq!(aggregate.backends(), vec![BackendKind::Dns]);
    }

    #[test]
    fn test_unique_keys_prefers_earlier_sources() {
        let aggregate = AggregateResult {
            results: vec![
                result(BackendKind::Dns, &["AA", "BB"]),
                result(BackendKind::Hkp, &["bb", "CC"]),
            ],
        };

        let keys = aggregate.unique_keys();
        let fingerprints: Vec<_> = keys.iter().map(|k| k.fingerprint.clone().unwrap()).collect();
        assert_eq!(fingerprints, vec!["AA", "BB", "CC"]);
        assert_eq!(keys[1].material, KeyMaterial::Armored("key BB".to_string()));
        // Per-source entries are left untouched
        assert_eq!(aggregate.results()[1].len(), 2);
    }

    #[test]
    fn test_aggregate_serializes_as_list() {
        let aggregate = AggregateResult {
            results: vec![result(BackendKind::Hkp, &["AA"])],
        };
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json[0]["backend"], "hkp");
        assert_eq!(json[0]["keys"][0]["fingerprint"], "AA");
    }

    #[tokio::test]
    async fn test_unknown_type_yields_empty_result() {
        let discoverer = KeyDiscoverer::new(BackendRegistry::new(), Duration::from_secs(1));
        let aggregate = discoverer.lookup_identity("alice@example.org", "carrier-pigeon").await;
        assert!(aggregate.is_empty());
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let config = KeyDiscoveryConfig {
            deadline_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            KeyDiscoverer::from_config(&config),
            Err(DiscoveryError::ConfigurationError(_))
        ));
    }
}

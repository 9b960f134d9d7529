//! Public Key Discovery
//!
//! This crate looks up public keys for a contact identifier across
//! several independent directories:
//! - DNS OPENPGPKEY records (RFC 7929)
//! - Keybase-style web-of-trust directory
//! - HKP keyservers
//!
//! Backends are enabled through configuration. A lookup fans out to every
//! backend able to resolve the identifier type; faults are isolated per
//! backend and never surface to the caller.
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


pub mod error;
pub mod traits;
pub mod registry;
pub mod discoverer;

mod client;

pub mod dns;
pub mod keybase;
pub mod hkp;

pub use error::{BackendFault, BackendResult, DiscoveryError, DiscoveryResult};
pub use traits::{
    BackendKind, Identifier, IdentifierType, KeyBackend, KeyMaterial, KeyRecord, LookupResult,
};
pub use registry::BackendRegistry;
pub use discoverer::{AggregateResult, BackendOutcome, BackendReport, DiscoveryReport, KeyDiscoverer};

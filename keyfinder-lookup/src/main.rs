//! Keyfinder Lookup
//!
//! Loads the key discovery configuration, runs one lookup across the
//! enabled backends and prints the aggregate result as JSON on stdout.
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


use clap::Parser;
use key_discovery::KeyDiscoverer;
use keyfinder_config::KeyDiscoveryConfig;
use keyfinder_logging::{init_console_logging, init_logging};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "keyfinder-lookup", version, about = "Discover public keys for a contact identifier")]
struct Args {
    /// Identifier type: email, fingerprint, keybase, twitter, github, reddit, hackernews
    #[arg(value_name = "TYPE")]
    identifier_type: String,

    /// Identifier to look up, e.g. alice@example.org
    #[arg(value_name = "IDENTIFIER")]
    identifier: String,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit JSON logs instead of human-readable ones
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = KeyDiscoveryConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    if args.json_logs {
        init_logging("keyfinder-lookup", config.log_level());
    } else {
        init_console_logging("keyfinder-lookup", config.log_level());
    }

    let discoverer = KeyDiscoverer::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize key discovery: {}", e))?;

    if discoverer.registry().is_empty() {
        warn!("No key discovery backend enabled - lookups will return nothing");
    }

    let aggregate = discoverer
        .lookup_identity(&args.identifier, &args.identifier_type)
        .await;

    info!(
        identifier = %args.identifier,
        sources = aggregate.len(),
        keys = aggregate.unique_keys().len(),
        "Lookup finished"
    );

    println!("{}", serde_json::to_string_pretty(&aggregate)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_arguments() {
        let args = Args::try_parse_from([
            "keyfinder-lookup",
            "--config",
            "/etc/keyfinder.toml",
            "email",
            "alice@example.org",
        ])
        .unwrap();
        assert_eq!(args.identifier_type, "email");
        assert_eq!(args.identifier, "alice@example.org");
        assert_eq!(args.config, Some(PathBuf::from("/etc/keyfinder.toml")));
        assert!(!args.json_logs);
    }

    #[test]
    fn test_missing_identifier_is_rejected() {
        assert!(Args::try_parse_from(["keyfinder-lookup", "email"]).is_err());
    }
}

// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

//! Configuration loader for the gatekeeper service.
//!
//! This module handles loading configuration from multiple sources with
//! the following precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (YAML)
//! 3. Default values

use super::types::GateFileConfig;
use crate::engine::Dimension;
use crate::security::parse_cidr;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from file and environment.
///
/// # Arguments
///
/// * `config_path` - Optional path to configuration file. If None, searches default locations.
///
/// # Default Locations
///
/// If no config path is specified, searches in order:
/// 1. `./gatekeeper.yaml` (current directory)
/// 2. `/etc/gatekeeper/config.yaml` (system-wide)
/// 3. `$XDG_CONFIG_HOME/gatekeeper/config.yaml` or `~/.config/gatekeeper/config.yaml` (user-specific)
///
/// # Environment Variables
///
/// The following environment variables can override config file settings:
///
/// - `GATEKEEPER_IP_THRESHOLD` - Attempts per window from one IP
/// - `GATEKEEPER_LOGIN_THRESHOLD` - Attempts per window for one login
/// - `GATEKEEPER_CREDENTIAL_THRESHOLD` - Attempts per window with one credential
/// - `GATEKEEPER_WINDOW` - Window lifetime in seconds, applied to all dimensions.
///   A housekeeping interval shorter than the new window is raised to twice it.
/// - `GATEKEEPER_HOUSEKEEPING_PERIOD` - Seconds between housekeeping passes
/// - `GATEKEEPER_ALLOW_LIST` - Comma-separated allow-list CIDRs
/// - `GATEKEEPER_DENY_LIST` - Comma-separated deny-list CIDRs
///
/// # Example
///
/// ```no_run
/// use gatekeeper::server::config::load_config;
///
/// # fn main() -> anyhow::Result<()> {
/// // Load from default locations
/// let config = load_config(None)?;
///
/// // Load from specific file
/// let config = load_config(Some("/etc/gatekeeper/custom.yaml".as_ref()))?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if:
/// - Configuration file cannot be read or parsed
/// - Environment variables have invalid values
/// - Configuration validation fails
pub fn load_config(config_path: Option<&Path>) -> Result<GateFileConfig> {
    let mut config = GateFileConfig::default();

    if let Some(path) = config_path {
        config = load_config_file(path).context("Failed to load configuration file")?;
        tracing::info!(path = %path.display(), "Loaded configuration from file");
    } else {
        for path in default_config_paths() {
            if path.exists() {
                config = load_config_file(&path).context("Failed to load configuration file")?;
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                break;
            }
        }
    }

    config = apply_env_overrides(config)?;

    validate_config(&config)?;

    Ok(config)
}

/// Generate a configuration template as YAML string.
///
/// # Example
///
/// ```
/// use gatekeeper::server::config::generate_config_template;
///
/// let template = generate_config_template();
/// assert!(template.contains("limits:"));
/// ```
pub fn generate_config_template() -> String {
    let config = GateFileConfig::default();
    let mut yaml = String::new();

    yaml.push_str("# gatekeeper configuration file\n");
    yaml.push_str("#\n");
    yaml.push_str("# All durations are in seconds.\n");
    yaml.push_str("# limits.<dimension>.threshold: attempts allowed per window\n");
    yaml.push_str("# limits.<dimension>.lifetime: window length\n");
    yaml.push_str(
        "# limits.<dimension>.housekeeping_interval: idle time before an entry is evicted\n",
    );
    yaml.push_str("#   (must be >= lifetime)\n");
    yaml.push_str("# housekeeping.period: time between housekeeping passes\n");
    yaml.push_str("# lists.allow / lists.deny: CIDR ranges seeded at start-up\n");
    yaml.push_str("#\n");
    yaml.push_str("# State is kept in memory only and is lost on restart.\n");
    yaml.push_str("#\n");
    yaml.push_str("# Configuration hierarchy (highest to lowest precedence):\n");
    yaml.push_str("# 1. Environment variables (GATEKEEPER_* prefix)\n");
    yaml.push_str("# 2. This configuration file\n");
    yaml.push_str("# 3. Default values\n\n");

    yaml.push_str(&serde_yaml::to_string(&config).unwrap_or_default());

    yaml
}

/// Load configuration from a YAML file.
fn load_config_file(path: &Path) -> Result<GateFileConfig> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    serde_yaml::from_str(&content).context(format!("Failed to parse {}", path.display()))
}

/// Get default configuration file search paths.
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("./gatekeeper.yaml"));

    paths.push(PathBuf::from("/etc/gatekeeper/config.yaml"));

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("gatekeeper/config.yaml"));
    }

    paths
}

fn split_cidrs(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Apply environment variable overrides to configuration.
fn apply_env_overrides(mut config: GateFileConfig) -> Result<GateFileConfig> {
    // GATEKEEPER_{IP,LOGIN,CREDENTIAL}_THRESHOLD
    for dimension in Dimension::ALL {
        let var = format!(
            "GATEKEEPER_{}_THRESHOLD",
            dimension.as_str().to_ascii_uppercase()
        );
        if let Ok(value) = std::env::var(&var) {
            let threshold: u32 = value
                .parse()
                .context(format!("Invalid {var} value: {value}"))?;
            config.limits.get_mut(dimension).threshold = Some(threshold);
            tracing::debug!(dimension = %dimension, threshold, "Applied {var} override");
        }
    }

    // GATEKEEPER_WINDOW
    if let Ok(value) = std::env::var("GATEKEEPER_WINDOW") {
        let lifetime: u64 = value
            .parse()
            .context(format!("Invalid GATEKEEPER_WINDOW value: {value}"))?;
        for dimension in Dimension::ALL {
            let limits = config.limits.get_mut(dimension);
            limits.lifetime = lifetime;
            // Eviction must not lift a block before its window ends
            if limits.housekeeping_interval < lifetime {
                limits.housekeeping_interval = lifetime.saturating_mul(2);
            }
        }
        tracing::debug!(lifetime, "Applied GATEKEEPER_WINDOW override");
    }

    // GATEKEEPER_HOUSEKEEPING_PERIOD
    if let Ok(value) = std::env::var("GATEKEEPER_HOUSEKEEPING_PERIOD") {
        config.housekeeping.period = value
            .parse()
            .context(format!("Invalid GATEKEEPER_HOUSEKEEPING_PERIOD value: {value}"))?;
        tracing::debug!(
            period = config.housekeeping.period,
            "Applied GATEKEEPER_HOUSEKEEPING_PERIOD override"
        );
    }

    // GATEKEEPER_ALLOW_LIST (comma-separated)
    if let Ok(value) = std::env::var("GATEKEEPER_ALLOW_LIST") {
        config.lists.allow = split_cidrs(&value);
        tracing::debug!(
            count = config.lists.allow.len(),
            "Applied GATEKEEPER_ALLOW_LIST override"
        );
    }

    // GATEKEEPER_DENY_LIST (comma-separated)
    if let Ok(value) = std::env::var("GATEKEEPER_DENY_LIST") {
        config.lists.deny = split_cidrs(&value);
        tracing::debug!(
            count = config.lists.deny.len(),
            "Applied GATEKEEPER_DENY_LIST override"
        );
    }

    Ok(config)
}

/// Validate configuration for correctness.
pub fn validate_config(config: &GateFileConfig) -> Result<()> {
    for dimension in Dimension::ALL {
        let limits = config.limits.get(dimension);

        if limits.threshold == Some(0) {
            anyhow::bail!("limits.{dimension}.threshold must be greater than 0");
        }

        if limits.lifetime == 0 {
            anyhow::bail!("limits.{dimension}.lifetime must be greater than 0");
        }

        // A shorter interval would let housekeeping evict a window that is
        // still rejecting, lifting the block early.
        if limits.housekeeping_interval < limits.lifetime {
            anyhow::bail!(
                "limits.{dimension}.housekeeping_interval ({}) must not be shorter than lifetime ({})",
                limits.housekeeping_interval,
                limits.lifetime
            );
        }
    }

    if config.housekeeping.period == 0 {
        anyhow::bail!("housekeeping.period must be greater than 0");
    }

    for cidr in &config.lists.allow {
        parse_cidr(cidr).context(format!("Invalid CIDR notation in lists.allow: {cidr}"))?;
    }

    for cidr in &config.lists.deny {
        parse_cidr(cidr).context(format!("Invalid CIDR notation in lists.deny: {cidr}"))?;
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}

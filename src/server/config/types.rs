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

//! Configuration types for the gatekeeper service.
//!
//! This module defines the YAML configuration schema. All durations are
//! expressed in whole seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{
    Dimension, EngineConfig, DEFAULT_CREDENTIAL_THRESHOLD, DEFAULT_HOUSEKEEPING_INTERVAL,
    DEFAULT_IP_THRESHOLD, DEFAULT_LIFETIME, DEFAULT_LOGIN_THRESHOLD,
};
use crate::security::LimiterConfig;

/// Main configuration loaded from YAML files.
///
/// # Example YAML
///
/// ```yaml
/// limits:
///   ip:
///     threshold: 1000
///   login:
///     threshold: 10
///     lifetime: 60
///     housekeeping_interval: 120
///
/// housekeeping:
///   period: 60
///
/// lists:
///   deny:
///     - "203.0.113.0/24"
///   allow:
///     - "10.0.0.0/8"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GateFileConfig {
    /// Per-dimension rate limits.
    pub limits: LimitsConfig,

    /// Background housekeeping schedule.
    pub housekeeping: HousekeepingConfig,

    /// Address ranges seeded into the allow and deny lists at start-up.
    pub lists: ListsConfig,
}

/// Rate limits for the three dimensions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub ip: LimitSettings,
    pub login: LimitSettings,
    pub credential: LimitSettings,
}

/// Rate limit for one dimension.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitSettings {
    /// Attempts allowed per window.
    ///
    /// When omitted the dimension's default applies (ip: 1000, login: 10,
    /// credential: 100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,

    /// Window length in seconds.
    ///
    /// Default: 60
    #[serde(default = "default_lifetime")]
    pub lifetime: u64,

    /// Idle time in seconds after which housekeeping evicts an entry.
    ///
    /// Must not be shorter than `lifetime`.
    ///
    /// Default: 120
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval: u64,
}

/// Background housekeeping schedule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HousekeepingConfig {
    /// Seconds between housekeeping passes on each cache.
    ///
    /// Default: 60
    #[serde(default = "default_housekeeping_period")]
    pub period: u64,
}

/// CIDR ranges seeded at start-up.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ListsConfig {
    /// Ranges that bypass rate limiting.
    ///
    /// Example: ["10.0.0.0/8"]
    #[serde(default)]
    pub allow: Vec<String>,

    /// Ranges that are always rejected.
    ///
    /// Example: ["203.0.113.0/24"]
    #[serde(default)]
    pub deny: Vec<String>,
}

// Default value functions

fn default_lifetime() -> u64 {
    DEFAULT_LIFETIME.as_secs()
}

fn default_housekeeping_interval() -> u64 {
    DEFAULT_HOUSEKEEPING_INTERVAL.as_secs()
}

fn default_housekeeping_period() -> u64 {
    60
}

// Default implementations

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            threshold: None,
            lifetime: default_lifetime(),
            housekeeping_interval: default_housekeeping_interval(),
        }
    }
}

impl LimitSettings {
    fn with_threshold(threshold: u32) -> Self {
        Self {
            threshold: Some(threshold),
            ..Self::default()
        }
    }

    /// Convert to limiter settings, filling in `default_threshold` if unset.
    pub fn to_limiter_config(&self, default_threshold: u32) -> LimiterConfig {
        LimiterConfig::new(
            self.threshold.unwrap_or(default_threshold),
            Duration::from_secs(self.lifetime),
            Duration::from_secs(self.housekeeping_interval),
        )
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            ip: LimitSettings::with_threshold(DEFAULT_IP_THRESHOLD),
            login: LimitSettings::with_threshold(DEFAULT_LOGIN_THRESHOLD),
            credential: LimitSettings::with_threshold(DEFAULT_CREDENTIAL_THRESHOLD),
        }
    }
}

impl LimitsConfig {
    /// Settings for one dimension.
    pub fn get(&self, dimension: Dimension) -> &LimitSettings {
        match dimension {
            Dimension::Ip => &self.ip,
            Dimension::Login => &self.login,
            Dimension::Credential => &self.credential,
        }
    }

    /// Mutable settings for one dimension.
    pub fn get_mut(&mut self, dimension: Dimension) -> &mut LimitSettings {
        match dimension {
            Dimension::Ip => &mut self.ip,
            Dimension::Login => &mut self.login,
            Dimension::Credential => &mut self.credential,
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            period: default_housekeeping_period(),
        }
    }
}

impl GateFileConfig {
    /// Build the engine configuration described by this file.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            ip: self.limits.ip.to_limiter_config(DEFAULT_IP_THRESHOLD),
            login: self.limits.login.to_limiter_config(DEFAULT_LOGIN_THRESHOLD),
            credential: self
                .limits
                .credential
                .to_limiter_config(DEFAULT_CREDENTIAL_THRESHOLD),
        }
    }

    /// Interval between housekeeping passes.
    pub fn housekeeping_period(&self) -> Duration {
        Duration::from_secs(self.housekeeping.period)
    }
}

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

//! Admission engine combining prefix lists and rate limiters.
//!
//! Rules are evaluated in the following order:
//!
//! 1. Unparsable IP → [`GateError::MalformedAddress`]
//! 2. IP in deny-list → `Deny(Denylisted)`, nothing else is touched
//! 3. IP in allow-list → `Allow`, rate limiters are bypassed
//! 4. IP, login and credential limiters are each charged exactly once, in
//!    that order; the first one that rejects names the reason
//!
//! Step 4 charges every dimension even after an earlier one rejected, so a
//! blocked attempt still counts against the others.
//!
//! # Example
//!
//! ```
//! use gatekeeper::engine::{AdmissionEngine, Decision, DenyReason, EngineConfig};
//!
//! let engine = AdmissionEngine::new(EngineConfig::default());
//! engine.mutate_deny_list("192.168.1.0/24", true).unwrap();
//!
//! assert_eq!(
//!     engine.check("192.168.1.1", "bob", "pw").unwrap(),
//!     Decision::Deny(DenyReason::Denylisted)
//! );
//! assert!(engine.check("10.0.0.1", "bob", "pw").unwrap().is_allowed());
//! ```

mod decision;

pub use decision::{Decision, DenyReason, Dimension};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{parse_ip, GateResult};
use crate::security::{parse_cidr, LimiterCache, LimiterConfig, PrefixList};

/// Default window for all three limiters.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(60);

/// Default idle time before housekeeping evicts an entry.
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(120);

/// Default attempts per window from one IP.
pub const DEFAULT_IP_THRESHOLD: u32 = 1000;

/// Default attempts per window for one login.
pub const DEFAULT_LOGIN_THRESHOLD: u32 = 10;

/// Default attempts per window with one credential.
pub const DEFAULT_CREDENTIAL_THRESHOLD: u32 = 100;

/// Limiter settings for the three dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub ip: LimiterConfig,
    pub login: LimiterConfig,
    pub credential: LimiterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limiter = |threshold| {
            LimiterConfig::new(threshold, DEFAULT_LIFETIME, DEFAULT_HOUSEKEEPING_INTERVAL)
        };
        Self {
            ip: limiter(DEFAULT_IP_THRESHOLD),
            login: limiter(DEFAULT_LOGIN_THRESHOLD),
            credential: limiter(DEFAULT_CREDENTIAL_THRESHOLD),
        }
    }
}

impl EngineConfig {
    /// Default windows with custom thresholds.
    pub fn with_thresholds(ip: u32, login: u32, credential: u32) -> Self {
        let mut config = Self::default();
        config.ip.threshold = ip;
        config.login.threshold = login;
        config.credential.threshold = credential;
        config
    }

    /// Limiter settings for one dimension.
    pub fn limiter(&self, dimension: Dimension) -> &LimiterConfig {
        match dimension {
            Dimension::Ip => &self.ip,
            Dimension::Login => &self.login,
            Dimension::Credential => &self.credential,
        }
    }
}

/// Counters describing the engine's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub tracked_ips: usize,
    pub tracked_logins: usize,
    pub tracked_credentials: usize,
    pub allow_list_len: usize,
    pub deny_list_len: usize,
}

/// Brute-force admission gate.
///
/// Owns one deny-list, one allow-list and three rate limiter caches. Every
/// component carries its own lock and no lock is held while calling into
/// another component, so the engine can be shared across any number of
/// threads without deadlock.
#[derive(Debug)]
pub struct AdmissionEngine {
    deny_list: PrefixList,
    allow_list: PrefixList,
    by_ip: Arc<LimiterCache>,
    by_login: Arc<LimiterCache>,
    by_credential: Arc<LimiterCache>,
}

impl AdmissionEngine {
    /// Create an engine with empty lists.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            deny_list: PrefixList::new("deny"),
            allow_list: PrefixList::new("allow"),
            by_ip: Arc::new(LimiterCache::new(config.ip)),
            by_login: Arc::new(LimiterCache::new(config.login)),
            by_credential: Arc::new(LimiterCache::new(config.credential)),
        }
    }

    /// Create an engine with pre-populated allow and deny lists.
    ///
    /// # Returns
    ///
    /// Returns an error if any CIDR string is invalid.
    pub fn with_lists(
        config: EngineConfig,
        allow_cidrs: &[String],
        deny_cidrs: &[String],
    ) -> GateResult<Self> {
        Ok(Self {
            deny_list: PrefixList::from_cidrs("deny", deny_cidrs)?,
            allow_list: PrefixList::from_cidrs("allow", allow_cidrs)?,
            ..Self::new(config)
        })
    }

    /// Decide whether a login attempt may proceed.
    ///
    /// The credential is only used as an opaque limiter key and is never
    /// logged.
    pub fn check(&self, ip: &str, login: &str, credential: &str) -> GateResult<Decision> {
        let addr = parse_ip(ip).inspect_err(|_| {
            tracing::warn!(ip = %ip, "Rejecting check with malformed IP");
        })?;

        if self.deny_list.contains(addr) {
            tracing::debug!(ip = %addr, "IP in deny-list");
            return Ok(Decision::Deny(DenyReason::Denylisted));
        }

        if self.allow_list.contains(addr) {
            tracing::debug!(ip = %addr, "IP in allow-list, skipping rate limits");
            return Ok(Decision::Allow);
        }

        // Every limiter is charged before the verdict is picked
        let outcomes = [
            (Dimension::Ip, self.by_ip.check(&addr.to_string())),
            (Dimension::Login, self.by_login.check(login)),
            (Dimension::Credential, self.by_credential.check(credential)),
        ];

        let decision = outcomes
            .iter()
            .find(|(_, allowed)| !allowed)
            .map_or(Decision::Allow, |(dimension, _)| {
                Decision::Deny(dimension.threshold_reason())
            });

        tracing::debug!(ip = %addr, login = %login, decision = %decision, "Check completed");
        Ok(decision)
    }

    /// Clear the IP and login counters for a pair.
    ///
    /// The credential counter is left alone: resets are scoped to who and
    /// where, not to which password was tried.
    pub fn reset(&self, ip: &str, login: &str) -> GateResult<()> {
        let addr = parse_ip(ip).inspect_err(|_| {
            tracing::warn!(ip = %ip, "Rejecting reset with malformed IP");
        })?;

        self.by_ip.reset(&addr.to_string());
        self.by_login.reset(login);

        tracing::info!(ip = %addr, login = %login, "Reset rate limits");
        Ok(())
    }

    /// Add (`is_add = true`) or remove a deny-list range.
    pub fn mutate_deny_list(&self, cidr: &str, is_add: bool) -> GateResult<()> {
        Self::mutate(&self.deny_list, cidr, is_add)
    }

    /// Add (`is_add = true`) or remove an allow-list range.
    pub fn mutate_allow_list(&self, cidr: &str, is_add: bool) -> GateResult<()> {
        Self::mutate(&self.allow_list, cidr, is_add)
    }

    fn mutate(list: &PrefixList, cidr: &str, is_add: bool) -> GateResult<()> {
        let network = parse_cidr(cidr).inspect_err(|e| {
            tracing::warn!(list = list.name(), error = %e, "Rejecting list mutation");
        })?;
        if is_add {
            list.insert(network);
        } else {
            list.remove(&network);
        }
        Ok(())
    }

    /// The rate limiter cache for one dimension.
    ///
    /// Returned as an `Arc` so maintenance tasks can hold it independently.
    pub fn limiter(&self, dimension: Dimension) -> &Arc<LimiterCache> {
        match dimension {
            Dimension::Ip => &self.by_ip,
            Dimension::Login => &self.by_login,
            Dimension::Credential => &self.by_credential,
        }
    }

    pub fn deny_list(&self) -> &PrefixList {
        &self.deny_list
    }

    pub fn allow_list(&self) -> &PrefixList {
        &self.allow_list
    }

    /// Snapshot of tracked keys and list sizes.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            tracked_ips: self.by_ip.len(),
            tracked_logins: self.by_login.len(),
            tracked_credentials: self.by_credential.len(),
            allow_list_len: self.allow_list.len(),
            deny_list_len: self.deny_list.len(),
        }
    }
}

impl Default for AdmissionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;

    fn engine(ip: u32, login: u32, credential: u32) -> AdmissionEngine {
        AdmissionEngine::new(EngineConfig::with_thresholds(ip, login, credential))
    }

    fn counter(engine: &AdmissionEngine, dimension: Dimension, key: &str) -> Option<u32> {
        engine
            .limiter(dimension)
            .snapshot(key)
            .map(|snap| snap.counter)
    }

    #[test]
    fn test_credential_threshold_hit_first() {
        let engine = engine(10, 5, 3);

        for _ in 0..3 {
            assert_eq!(
                engine.check("1.2.3.4", "alice", "pw1").unwrap(),
                Decision::Allow
            );
        }
        assert_eq!(
            engine.check("1.2.3.4", "alice", "pw1").unwrap(),
            Decision::Deny(DenyReason::CredentialThresholdExceeded)
        );
    }

    #[test]
    fn test_ip_reason_takes_precedence() {
        let engine = engine(1, 1, 1);

        assert!(engine.check("1.2.3.4", "alice", "pw").unwrap().is_allowed());
        assert_eq!(
            engine.check("1.2.3.4", "alice", "pw").unwrap(),
            Decision::Deny(DenyReason::IpThresholdExceeded)
        );
    }

    #[test]
    fn test_login_reason_before_credential() {
        let engine = engine(100, 2, 2);

        engine.check("1.1.1.1", "carol", "a").unwrap();
        engine.check("1.1.1.2", "carol", "a").unwrap();
        assert_eq!(
            engine.check("1.1.1.3", "carol", "a").unwrap(),
            Decision::Deny(DenyReason::LoginThresholdExceeded)
        );
    }

    #[test]
    fn test_rejected_attempt_still_charges_all_dimensions() {
        let engine = engine(100, 1, 100);

        engine.check("5.5.5.5", "dave", "x").unwrap();
        assert_eq!(
            engine.check("5.5.5.5", "dave", "y").unwrap(),
            Decision::Deny(DenyReason::LoginThresholdExceeded)
        );

        assert_eq!(counter(&engine, Dimension::Ip, "5.5.5.5"), Some(2));
        assert_eq!(counter(&engine, Dimension::Login, "dave"), Some(2));
        assert_eq!(counter(&engine, Dimension::Credential, "y"), Some(1));
    }

    #[test]
    fn test_deny_list_short_circuits() {
        let engine = engine(1, 1, 1);
        engine.mutate_deny_list("192.168.1.0/24", true).unwrap();
        engine.mutate_allow_list("192.168.0.0/16", true).unwrap();

        for _ in 0..3 {
            assert_eq!(
                engine.check("192.168.1.1", "bob", "pw2").unwrap(),
                Decision::Deny(DenyReason::Denylisted)
            );
        }
        let stats = engine.stats();
        assert_eq!(stats.tracked_ips, 0);
        assert_eq!(stats.tracked_logins, 0);
        assert_eq!(stats.tracked_credentials, 0);
    }

    #[test]
    fn test_allow_list_bypasses_limits() {
        let engine = engine(1, 1, 1);
        engine.mutate_allow_list("10.0.0.0/8", true).unwrap();

        for _ in 0..20 {
            assert_eq!(
                engine.check("10.0.0.5", "eve", "pw").unwrap(),
                Decision::Allow
            );
        }
        assert_eq!(engine.stats().tracked_ips, 0);
    }

    #[test]
    fn test_removing_allow_entry_restores_limits() {
        let engine = engine(1, 100, 100);
        engine.mutate_allow_list("10.0.0.0/8", true).unwrap();
        engine.check("10.0.0.5", "eve", "pw").unwrap();

        engine.mutate_allow_list("10.0.0.0/8", false).unwrap();
        assert!(engine.check("10.0.0.5", "eve", "pw").unwrap().is_allowed());
        assert_eq!(
            engine.check("10.0.0.5", "eve", "pw").unwrap(),
            Decision::Deny(DenyReason::IpThresholdExceeded)
        );
    }

    #[test]
    fn test_malformed_ip() {
        let engine = engine(1, 1, 1);
        let err = engine.check("not-an-ip", "alice", "pw").unwrap_err();
        assert_eq!(
            err,
            GateError::MalformedAddress {
                input: "not-an-ip".to_string()
            }
        );
        // Nothing was charged
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn test_reset_clears_ip_and_login_only() {
        let engine = engine(1, 1, 1);

        engine.check("1.2.3.4", "alice", "pw").unwrap();
        assert!(!engine.check("1.2.3.4", "alice", "pw").unwrap().is_allowed());

        engine.reset("1.2.3.4", "alice").unwrap();
        assert_eq!(counter(&engine, Dimension::Ip, "1.2.3.4"), None);
        assert_eq!(counter(&engine, Dimension::Login, "alice"), None);
        assert_eq!(counter(&engine, Dimension::Credential, "pw"), Some(2));

        // Same password is still blocked
        assert_eq!(
            engine.check("1.2.3.4", "alice", "pw").unwrap(),
            Decision::Deny(DenyReason::CredentialThresholdExceeded)
        );
    }

    #[test]
    fn test_reset_rejects_malformed_ip() {
        let engine = engine(1, 1, 1);
        engine.check("1.2.3.4", "alice", "pw").unwrap();

        assert!(matches!(
            engine.reset("1.2.3", "alice"),
            Err(GateError::MalformedAddress { .. })
        ));
        assert_eq!(counter(&engine, Dimension::Login, "alice"), Some(1));
    }

    #[test]
    fn test_mutation_validates_cidr_first() {
        let engine = engine(1, 1, 1);

        for is_add in [true, false] {
            assert!(matches!(
                engine.mutate_deny_list("10.0.0.0/40", is_add),
                Err(GateError::MalformedCidr { .. })
            ));
            assert!(matches!(
                engine.mutate_allow_list("10.0.0.1", is_add),
                Err(GateError::MalformedCidr { .. })
            ));
        }
        assert!(engine.deny_list().is_empty());
        assert!(engine.allow_list().is_empty());

        // Removing an absent range is fine
        assert!(engine.mutate_deny_list("10.0.0.0/8", false).is_ok());
    }

    #[test]
    fn test_ipv6_keys_are_canonical() {
        let engine = engine(1, 100, 100);

        engine.check("2001:db8:0:0::1", "a", "x").unwrap();
        assert_eq!(
            engine.check("2001:DB8::1", "b", "y").unwrap(),
            Decision::Deny(DenyReason::IpThresholdExceeded)
        );
        assert_eq!(counter(&engine, Dimension::Ip, "2001:db8::1"), Some(2));
    }

    #[test]
    fn test_mapped_deny_range_blocks_mapped_and_plain_ipv4() {
        let engine = engine(100, 100, 100);
        engine
            .mutate_deny_list("::ffff:192.168.1.0/120", true)
            .unwrap();

        assert_eq!(
            engine.check("::ffff:192.168.1.1", "bob", "pw").unwrap(),
            Decision::Deny(DenyReason::Denylisted)
        );
        assert_eq!(
            engine.check("192.168.1.200", "bob", "pw").unwrap(),
            Decision::Deny(DenyReason::Denylisted)
        );
        assert!(engine.check("192.168.2.1", "bob", "pw").unwrap().is_allowed());
    }

    #[test]
    fn test_with_lists() {
        let engine = AdmissionEngine::with_lists(
            EngineConfig::default(),
            &["10.0.0.0/8".to_string()],
            &["203.0.113.0/24".to_string(), "2001:db8::/32".to_string()],
        )
        .unwrap();

        let stats = engine.stats();
        assert_eq!(stats.allow_list_len, 1);
        assert_eq!(stats.deny_list_len, 2);
        assert_eq!(
            engine.check("2001:db8::5", "x", "y").unwrap(),
            Decision::Deny(DenyReason::Denylisted)
        );

        let bad = AdmissionEngine::with_lists(EngineConfig::default(), &["bad".into()], &[]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_window_expiry_through_engine() {
        let mut config = EngineConfig::with_thresholds(1, 100, 100);
        config.ip.lifetime = Duration::from_millis(30);
        let engine = AdmissionEngine::new(config);

        engine.check("9.9.9.9", "a", "1").unwrap();
        assert!(!engine.check("9.9.9.9", "b", "2").unwrap().is_allowed());

        std::thread::sleep(Duration::from_millis(60));
        assert!(engine.check("9.9.9.9", "c", "3").unwrap().is_allowed());
    }
}

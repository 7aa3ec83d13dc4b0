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

//! Verdict types returned by the admission engine.

use std::fmt;

use crate::error::StatusClass;

/// One of the three independently rate-limited axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Source IP address.
    Ip,
    /// Login name.
    Login,
    /// Credential value (opaque, typically pre-hashed).
    Credential,
}

impl Dimension {
    /// All dimensions in evaluation order.
    pub const ALL: [Dimension; 3] = [Dimension::Ip, Dimension::Login, Dimension::Credential];

    /// Lowercase name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Ip => "ip",
            Dimension::Login => "login",
            Dimension::Credential => "credential",
        }
    }

    /// Rejection reason produced when this dimension's threshold is exceeded.
    pub fn threshold_reason(&self) -> DenyReason {
        match self {
            Dimension::Ip => DenyReason::IpThresholdExceeded,
            Dimension::Login => DenyReason::LoginThresholdExceeded,
            Dimension::Credential => DenyReason::CredentialThresholdExceeded,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The source address is inside a deny-listed range.
    Denylisted,
    /// Too many attempts from this IP in the current window.
    IpThresholdExceeded,
    /// Too many attempts for this login in the current window.
    LoginThresholdExceeded,
    /// Too many attempts with this credential in the current window.
    CredentialThresholdExceeded,
}

impl DenyReason {
    /// Stable snake_case identifier for wire formats and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Denylisted => "denylisted",
            DenyReason::IpThresholdExceeded => "ip_threshold_exceeded",
            DenyReason::LoginThresholdExceeded => "login_threshold_exceeded",
            DenyReason::CredentialThresholdExceeded => "credential_threshold_exceeded",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Let the attempt through.
    Allow,
    /// Reject the attempt.
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            Decision::Allow => StatusClass::Ok,
            Decision::Deny(_) => StatusClass::PermissionDenied,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny(reason) => write!(f, "deny ({reason})"),
        }
    }
}

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

//! Error types for the admission gate.
//!
//! Only malformed input is an error. Deny-list hits and exhausted thresholds
//! are verdicts and travel in [`crate::engine::Decision`] instead.

use std::net::IpAddr;

use thiserror::Error;

/// Errors returned by the prefix lists and the admission engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    /// The IP address text could not be parsed.
    #[error("malformed IP address '{input}'")]
    MalformedAddress { input: String },

    /// The CIDR text could not be parsed.
    #[error("malformed CIDR '{input}': {reason}")]
    MalformedCidr { input: String, reason: String },
}

impl GateError {
    pub(crate) fn malformed_address(input: &str) -> Self {
        Self::MalformedAddress {
            input: input.to_string(),
        }
    }

    pub(crate) fn malformed_cidr(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedCidr {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Status class a transport should report for this error.
    ///
    /// Malformed input is always the caller's fault.
    pub fn status_class(&self) -> StatusClass {
        StatusClass::InvalidArgument
    }
}

/// Result alias for gate operations.
pub type GateResult<T> = std::result::Result<T, GateError>;

/// Coarse outcome class for mapping results onto a transport.
///
/// Hosting layers translate this into whatever their wire format uses,
/// e.g. a gRPC status code or an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// The attempt is admitted or the mutation succeeded.
    Ok,
    /// The caller is blocked (deny-list or threshold).
    PermissionDenied,
    /// The request itself was bad (unparsable address or CIDR).
    InvalidArgument,
}

/// Parse a bare IP address, mapping failure to [`GateError::MalformedAddress`].
///
/// IPv4-mapped IPv6 addresses are folded into their IPv4 form so that they
/// match IPv4 prefixes and share IPv4 rate-limit keys.
pub fn parse_ip(text: &str) -> GateResult<IpAddr> {
    text.parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| GateError::malformed_address(text))
}

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

//! Brute-force and credential-stuffing admission gate.
//!
//! Given a login attempt's source IP, login name and credential, the
//! [`AdmissionEngine`] decides whether the attempt may proceed. It combines
//! CIDR deny/allow lists with three fixed-window rate limiters, one per
//! dimension. All state is in memory and is lost on restart.
//!
//! ```
//! use gatekeeper::{AdmissionEngine, Decision, DenyReason, EngineConfig};
//!
//! let engine = AdmissionEngine::new(EngineConfig::with_thresholds(10, 5, 3));
//! for _ in 0..3 {
//!     assert_eq!(engine.check("1.2.3.4", "alice", "pw1").unwrap(), Decision::Allow);
//! }
//! assert_eq!(
//!     engine.check("1.2.3.4", "alice", "pw1").unwrap(),
//!     Decision::Deny(DenyReason::CredentialThresholdExceeded)
//! );
//! ```

pub mod engine;
pub mod error;
pub mod security;
pub mod server;
pub mod utils;

pub use engine::{AdmissionEngine, Decision, DenyReason, Dimension, EngineConfig, EngineStats};
pub use error::{GateError, GateResult, StatusClass};
pub use security::{LimiterCache, LimiterConfig, PrefixList};

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

//! CIDR prefix lists used as allow-list and deny-list.
//!
//! A [`PrefixList`] is a thread-safe set of IPv4/IPv6 networks answering
//! "is this address inside any stored range". Overlapping ranges coexist:
//! removing one leaves addresses covered by the others matched.
//!
//! # Example
//!
//! ```
//! use gatekeeper::security::PrefixList;
//!
//! let deny = PrefixList::new("deny");
//! deny.insert_cidr("192.168.0.0/16").unwrap();
//! deny.insert_cidr("192.168.100.0/24").unwrap();
//!
//! assert!(deny.look_up_ip("192.168.100.7").unwrap());
//!
//! deny.delete_cidr("192.168.0.0/16").unwrap();
//! assert!(deny.look_up_ip("192.168.100.7").unwrap());
//! assert!(!deny.look_up_ip("192.168.1.1").unwrap());
//! ```

use std::net::IpAddr;

use ipnetwork::{IpNetwork, Ipv4Network};
use parking_lot::RwLock;

use super::trie::PrefixTrie;
use crate::error::{parse_ip, GateError, GateResult};

/// Parse CIDR text into a network with host bits cleared.
///
/// The `/bits` suffix is mandatory; a bare address is rejected. Ranges inside
/// `::ffff:0:0/96` are stored as their IPv4 equivalent, matching how
/// [`parse_ip`] folds IPv4-mapped addresses.
pub fn parse_cidr(text: &str) -> GateResult<IpNetwork> {
    if !text.contains('/') {
        return Err(GateError::malformed_cidr(text, "missing prefix length"));
    }
    let network: IpNetwork = text
        .parse()
        .map_err(|e: ipnetwork::IpNetworkError| GateError::malformed_cidr(text, e.to_string()))?;
    let network = IpNetwork::new(network.network(), network.prefix())
        .map_err(|e| GateError::malformed_cidr(text, e.to_string()))?;
    Ok(fold_mapped_ipv4(network))
}

fn fold_mapped_ipv4(network: IpNetwork) -> IpNetwork {
    let IpNetwork::V6(v6) = network else {
        return network;
    };
    if v6.prefix() < 96 {
        return network;
    }
    v6.network()
        .to_ipv4_mapped()
        .and_then(|v4| Ipv4Network::new(v4, v6.prefix() - 96).ok())
        .map_or(network, IpNetwork::V4)
}

/// Thread-safe set of network prefixes backed by a prefix trie.
///
/// Mutations take the exclusive lock; lookups share the lock and run in
/// parallel with each other.
#[derive(Debug)]
pub struct PrefixList {
    /// Label used in log records ("allow", "deny").
    name: &'static str,
    trie: RwLock<PrefixTrie>,
}

impl PrefixList {
    /// Create an empty list. `name` only appears in log records.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            trie: RwLock::new(PrefixTrie::new()),
        }
    }

    /// Create a list pre-populated from CIDR strings.
    ///
    /// # Returns
    ///
    /// Returns an error on the first CIDR that does not parse.
    pub fn from_cidrs(name: &'static str, cidrs: &[String]) -> GateResult<Self> {
        let mut trie = PrefixTrie::new();
        for cidr in cidrs {
            trie.insert(parse_cidr(cidr)?);
        }

        tracing::info!(list = name, count = trie.len(), "Prefix list configured");

        Ok(Self {
            name,
            trie: RwLock::new(trie),
        })
    }

    /// Add a CIDR range.
    ///
    /// # Arguments
    ///
    /// * `cidr` - CIDR notation string (e.g., "192.168.0.0/16")
    pub fn insert_cidr(&self, cidr: &str) -> GateResult<()> {
        let network = parse_cidr(cidr)?;
        self.insert(network);
        Ok(())
    }

    /// Remove a CIDR range. Removing a range that is not stored succeeds.
    pub fn delete_cidr(&self, cidr: &str) -> GateResult<()> {
        let network = parse_cidr(cidr)?;
        self.remove(&network);
        Ok(())
    }

    /// Whether the textual address falls inside any stored range.
    pub fn look_up_ip(&self, ip: &str) -> GateResult<bool> {
        let ip = parse_ip(ip)?;
        Ok(self.contains(ip))
    }

    /// Add a network. Returns `false` if it was already stored.
    pub fn insert(&self, network: IpNetwork) -> bool {
        let inserted = self.trie.write().insert(network);
        if inserted {
            tracing::info!(list = self.name, network = %network, "Added to list");
        }
        inserted
    }

    /// Remove an exact network. Returns `false` if it was not stored.
    pub fn remove(&self, network: &IpNetwork) -> bool {
        let removed = self.trie.write().remove(network);
        if removed {
            tracing::info!(list = self.name, network = %network, "Removed from list");
        }
        removed
    }

    /// Whether `ip` falls inside any stored range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.trie.read().contains(ip)
    }

    /// The most specific stored range containing `ip`.
    pub fn longest_match(&self, ip: IpAddr) -> Option<IpNetwork> {
        self.trie.read().longest_match(ip)
    }

    /// Get a copy of the stored networks.
    pub fn networks(&self) -> Vec<IpNetwork> {
        self.trie.read().networks()
    }

    /// Get the number of stored networks.
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.trie.read().is_empty()
    }

    /// Label given at construction.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

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

//! Binary prefix trie over IPv4 and IPv6 networks.
//!
//! Each address family has its own root. A stored prefix of length `n` marks
//! the node reached after following its first `n` bits, so a lookup touches at
//! most 32 (IPv4) or 128 (IPv6) nodes regardless of how many prefixes are
//! stored.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;

#[derive(Debug, Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    terminal: bool,
}

impl Node {
    fn is_empty(&self) -> bool {
        !self.terminal && self.children.iter().all(Option::is_none)
    }
}

/// Address left-aligned into 128 bits, plus the family it came from.
#[derive(Debug, Clone, Copy)]
struct Key {
    bits: u128,
    v4: bool,
}

impl Key {
    fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self {
                bits: u128::from(u32::from(v4)) << 96,
                v4: true,
            },
            IpAddr::V6(v6) => Self {
                bits: u128::from(v6),
                v4: false,
            },
        }
    }

    fn bit(&self, depth: u8) -> usize {
        ((self.bits >> (127 - u32::from(depth))) & 1) as usize
    }

    fn to_network(self, prefix: u8) -> Option<IpNetwork> {
        let masked = if prefix == 0 {
            0
        } else {
            self.bits & (u128::MAX << (128 - u32::from(prefix)))
        };
        let ip = if self.v4 {
            IpAddr::V4(Ipv4Addr::from((masked >> 96) as u32))
        } else {
            IpAddr::V6(Ipv6Addr::from(masked))
        };
        IpNetwork::new(ip, prefix).ok()
    }
}

/// Set of IP networks supporting containment lookup in O(address bits).
#[derive(Debug, Default)]
pub struct PrefixTrie {
    v4: Node,
    v6: Node,
    len: usize,
}

impl PrefixTrie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    fn root(&self, key: &Key) -> &Node {
        if key.v4 {
            &self.v4
        } else {
            &self.v6
        }
    }

    fn root_mut(&mut self, key: &Key) -> &mut Node {
        if key.v4 {
            &mut self.v4
        } else {
            &mut self.v6
        }
    }

    /// Insert a network. Returns `false` if it was already present.
    pub fn insert(&mut self, network: IpNetwork) -> bool {
        let key = Key::from_ip(network.network());
        let mut node = self.root_mut(&key);
        for depth in 0..network.prefix() {
            node = node.children[key.bit(depth)]
                .get_or_insert_with(Box::default)
                .as_mut();
        }
        if node.terminal {
            return false;
        }
        node.terminal = true;
        self.len += 1;
        true
    }

    /// Remove an exact network. Returns `false` if it was not present.
    ///
    /// Networks that merely overlap the removed one are left untouched.
    pub fn remove(&mut self, network: &IpNetwork) -> bool {
        let key = Key::from_ip(network.network());
        let removed = remove_at(self.root_mut(&key), &key, 0, network.prefix());
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Whether any stored network contains `ip`.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.deepest_match(ip).is_some()
    }

    /// The most specific stored network containing `ip`.
    pub fn longest_match(&self, ip: IpAddr) -> Option<IpNetwork> {
        let key = Key::from_ip(ip);
        self.deepest_match(ip)
            .and_then(|prefix| key.to_network(prefix))
    }

    fn deepest_match(&self, ip: IpAddr) -> Option<u8> {
        let key = Key::from_ip(ip);
        let max_depth: u8 = if key.v4 { 32 } else { 128 };

        let mut node = self.root(&key);
        let mut found = node.terminal.then_some(0);
        for depth in 0..max_depth {
            match node.children[key.bit(depth)].as_deref() {
                Some(child) => node = child,
                None => break,
            }
            if node.terminal {
                found = Some(depth + 1);
            }
        }
        found
    }

    /// All stored networks, IPv4 first, each family in address order.
    pub fn networks(&self) -> Vec<IpNetwork> {
        let mut out = Vec::with_capacity(self.len);
        collect(&self.v4, Key { bits: 0, v4: true }, 0, &mut out);
        collect(&self.v6, Key { bits: 0, v4: false }, 0, &mut out);
        out
    }

    /// Number of stored networks.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the trie holds no networks.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn remove_at(node: &mut Node, key: &Key, depth: u8, prefix: u8) -> bool {
    if depth == prefix {
        return std::mem::replace(&mut node.terminal, false);
    }
    let bit = key.bit(depth);
    let Some(child) = node.children[bit].as_mut() else {
        return false;
    };
    let removed = remove_at(child, key, depth + 1, prefix);
    if removed && child.is_empty() {
        node.children[bit] = None;
    }
    removed
}

fn collect(node: &Node, key: Key, depth: u8, out: &mut Vec<IpNetwork>) {
    if node.terminal {
        if let Some(network) = key.to_network(depth) {
            out.push(network);
        }
    }
    for (bit, child) in node.children.iter().enumerate() {
        if let Some(child) = child {
            let bits = key.bits | ((bit as u128) << (127 - u32::from(depth)));
            collect(child, Key { bits, ..key }, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_and_contains() {
        let mut trie = PrefixTrie::new();
        assert!(trie.insert(net("192.168.1.0/24")));

        assert!(trie.contains(ip("192.168.1.0")));
        assert!(trie.contains(ip("192.168.1.255")));
        assert!(!trie.contains(ip("192.168.2.1")));
        assert!(!trie.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_duplicate_insert() {
        let mut trie = PrefixTrie::new();
        assert!(trie.insert(net("10.0.0.0/8")));
        assert!(!trie.insert(net("10.0.0.0/8")));
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_host_bits_are_masked() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.1.2.3/16"));
        assert!(trie.contains(ip("10.1.200.200")));
        assert_eq!(trie.networks(), vec![net("10.1.0.0/16")]);
    }

    #[test]
    fn test_overlapping_prefixes() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/8"));
        trie.insert(net("10.1.0.0/16"));

        assert_eq!(trie.longest_match(ip("10.1.2.3")), Some(net("10.1.0.0/16")));
        assert_eq!(trie.longest_match(ip("10.2.0.1")), Some(net("10.0.0.0/8")));

        assert!(trie.remove(&net("10.1.0.0/16")));
        assert!(trie.contains(ip("10.1.2.3")));

        assert!(trie.remove(&net("10.0.0.0/8")));
        assert!(!trie.contains(ip("10.1.2.3")));
        assert!(trie.is_empty());
    }

    #[test]
    fn test_remove_keeps_more_specific() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/8"));
        trie.insert(net("10.1.0.0/16"));

        assert!(trie.remove(&net("10.0.0.0/8")));
        assert!(trie.contains(ip("10.1.0.1")));
        assert!(!trie.contains(ip("10.2.0.1")));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/8"));

        assert!(!trie.remove(&net("10.0.0.0/16")));
        assert!(!trie.remove(&net("11.0.0.0/8")));
        assert_eq!(trie.len(), 1);
        assert!(trie.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_default_routes() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("0.0.0.0/0"));

        assert!(trie.contains(ip("8.8.8.8")));
        assert!(!trie.contains(ip("2001:db8::1")));
        assert_eq!(trie.longest_match(ip("8.8.8.8")), Some(net("0.0.0.0/0")));

        trie.insert(net("::/0"));
        assert!(trie.contains(ip("2001:db8::1")));
    }

    #[test]
    fn test_host_routes() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("1.2.3.4/32"));
        trie.insert(net("2001:db8::1/128"));

        assert!(trie.contains(ip("1.2.3.4")));
        assert!(!trie.contains(ip("1.2.3.5")));
        assert!(trie.contains(ip("2001:db8::1")));
        assert!(!trie.contains(ip("2001:db8::2")));
    }

    #[test]
    fn test_families_are_separate() {
        let mut trie = PrefixTrie::new();
        // ::/96 shares its leading bits with nothing in the IPv4 root
        trie.insert(net("::/96"));
        assert!(!trie.contains(ip("0.0.0.1")));
        assert!(trie.contains(ip("::1")));
    }

    #[test]
    fn test_networks_listing() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("192.168.0.0/16"));
        trie.insert(net("10.0.0.0/8"));
        trie.insert(net("2001:db8::/32"));

        assert_eq!(
            trie.networks(),
            vec![
                net("10.0.0.0/8"),
                net("192.168.0.0/16"),
                net("2001:db8::/32")
            ]
        );
    }

    #[test]
    fn test_matches_linear_scan() {
        let prefixes = [
            "10.0.0.0/8",
            "10.128.0.0/9",
            "172.16.0.0/12",
            "192.168.100.0/22",
            "203.0.113.7/32",
        ];
        let mut trie = PrefixTrie::new();
        let networks: Vec<IpNetwork> = prefixes.iter().map(|p| net(p)).collect();
        for n in &networks {
            trie.insert(*n);
        }

        let samples = [
            "10.0.0.1",
            "10.200.1.1",
            "11.0.0.1",
            "172.31.255.255",
            "172.32.0.0",
            "192.168.103.9",
            "192.168.104.0",
            "203.0.113.7",
            "203.0.113.8",
        ];
        for sample in samples {
            let addr = ip(sample);
            let linear = networks.iter().any(|n| n.contains(addr));
            assert_eq!(trie.contains(addr), linear, "mismatch for {sample}");
        }
    }
}

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

//! Building blocks of the admission gate.
//!
//! - [`LimiterCache`]: fixed-window attempt counters keyed by string
//! - [`PrefixList`]: CIDR allow/deny lists backed by a prefix trie
//!
//! Both are internally synchronized and can be shared by reference or `Arc`
//! across any number of threads.

mod access;
mod rate_limit;
mod trie;

pub use access::{parse_cidr, PrefixList};
pub use rate_limit::{LimiterCache, LimiterConfig, LimiterSnapshot};
pub use trie::PrefixTrie;

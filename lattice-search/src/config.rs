// Copyright (C) 2024 Lattice Search, Inc.
//
// Lattice Search is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@latticesearch.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_max_num_concurrent_split_searches() -> usize {
    4 * num_cpus::get()
}

fn default_request_deadline() -> Duration {
    Duration::from_secs(30)
}

fn default_max_inner_join_cardinality() -> u64 {
    10_000
}

fn default_max_join_depth() -> u32 {
    4
}

fn default_reorder_lookahead() -> u32 {
    0
}

fn default_overload_queue_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Per-process configuration for a searcher (leaf) instance (§5, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearcherConfig {
    /// Upper bound on the number of segments a single searcher searches
    /// concurrently. Defaults to four times the number of cores, mirroring
    /// the ratio a leaf search split semaphore is usually sized at.
    #[serde(default = "default_max_num_concurrent_split_searches")]
    pub max_num_concurrent_split_searches: usize,

    /// How long a leaf request may run before it is abandoned and reported
    /// as a failed shard to the broker (§5).
    #[serde(default = "default_request_deadline", with = "humantime_duration")]
    pub request_deadline: Duration,

    /// Hard cap on the number of documents an inner join query may return
    /// before being bound into the outer query; exceeding it is a
    /// `JoinTooLarge` error, never a silent truncation (§4.5, §9 Open
    /// Question 3).
    #[serde(default = "default_max_inner_join_cardinality")]
    pub max_inner_join_cardinality: u64,

    /// Hard cap on join nesting depth (§4.5).
    #[serde(default = "default_max_join_depth")]
    pub max_join_depth: u32,

    /// How long a request may sit in the concurrency-limiting queue
    /// before it is rejected with `Overloaded` rather than served stale
    /// (§5).
    #[serde(default = "default_overload_queue_timeout", with = "humantime_duration")]
    pub overload_queue_timeout: Duration,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            max_num_concurrent_split_searches: default_max_num_concurrent_split_searches(),
            request_deadline: default_request_deadline(),
            max_inner_join_cardinality: default_max_inner_join_cardinality(),
            max_join_depth: default_max_join_depth(),
            overload_queue_timeout: default_overload_queue_timeout(),
        }
    }
}

/// Per-process configuration for a broker (root) instance (§4.8, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    #[serde(default = "default_request_deadline", with = "humantime_duration")]
    pub request_deadline: Duration,

    /// Fraction (expressed as a denominator, i.e. 2 means half) of shards
    /// that may fail before the broker gives up instead of returning a
    /// `Partial` result (§7).
    #[serde(default = "default_partial_failure_denominator")]
    pub partial_failure_denominator: usize,

    /// How many hits beyond the requested page the broker keeps in scope
    /// for a Reordering rule, so a rule that moves a doc within the
    /// lookahead window doesn't uncover a hole at the page boundary
    /// (§4.8.4).
    #[serde(default = "default_reorder_lookahead")]
    pub reorder_lookahead: u32,
}

fn default_partial_failure_denominator() -> usize {
    2
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_deadline: default_request_deadline(),
            partial_failure_denominator: default_partial_failure_denominator(),
            reorder_lookahead: default_reorder_lookahead(),
        }
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_scale_with_cores() {
        let cfg = SearcherConfig::default();
        assert_eq!(cfg.max_num_concurrent_split_searches, 4 * num_cpus::get());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = BrokerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BrokerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.partial_failure_denominator, cfg.partial_failure_denominator);
    }
}

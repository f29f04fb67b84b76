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

//! Resolves a `RoutingHint` plus a namespace's `ShardingConfig` into the
//! concrete set of shards a broker fans a query out to (§4.7, §6.5).
//!
//! Unlike the teacher's `SearchJobPlacer`, which spreads load across
//! interchangeable nodes with rendez-vous hashing because any node can
//! serve any split, shard ownership here is fixed by the micro-shard hash
//! (§3 Sharding): a key belongs to exactly one shard, so routing is a pure
//! function of the hint and the sharding config, not a load-balancing
//! decision.

use std::collections::BTreeSet;

use lattice_schema::ShardingConfig;

use crate::wire::RoutingHint;

/// Picks the shards a query must be sent to. Returns shard ids in
/// ascending order, deduplicated.
pub fn resolve_shards(hint: &RoutingHint, sharding: &ShardingConfig) -> Vec<u32> {
    match hint {
        RoutingHint::None => (0..sharding.number_of_shards).collect(),
        RoutingHint::ByKey { keys } => {
            let shards: BTreeSet<u32> = keys.iter().map(|key| sharding.shard_for_key(key)).collect();
            shards.into_iter().collect()
        }
        RoutingHint::ByMicroShards { micro_shards } => {
            let shards: BTreeSet<u32> = micro_shards
                .iter()
                .map(|m| sharding.shard_for_micro_shard(*m))
                .collect();
            shards.into_iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_with_no_hint() {
        let sharding = ShardingConfig::new(4, 8).unwrap();
        assert_eq!(resolve_shards(&RoutingHint::None, &sharding), vec![0, 1, 2, 3]);
    }

    #[test]
    fn by_key_narrows_to_owning_shards() {
        let sharding = ShardingConfig::new(4, 16).unwrap();
        let key = "order-123".to_string();
        let expected_shard = sharding.shard_for_key(&key);
        let shards = resolve_shards(&RoutingHint::ByKey { keys: vec![key] }, &sharding);
        assert_eq!(shards, vec![expected_shard]);
    }

    #[test]
    fn by_micro_shards_dedups_to_owning_shard() {
        let sharding = ShardingConfig::new(2, 4).unwrap();
        let shards = resolve_shards(
            &RoutingHint::ByMicroShards {
                micro_shards: vec![0, 1],
            },
            &sharding,
        );
        assert_eq!(shards, vec![0]);
    }
}

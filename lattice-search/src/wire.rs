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

use std::collections::HashMap;

use lattice_query::SearchQuery;
use lattice_schema::FieldValue;
use serde::{Deserialize, Serialize};

/// A client-supplied routing hint (§6.5): when the caller already knows
/// which keys it cares about, it can narrow the broker's shard fan-out
/// instead of paying for a broadcast to every shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoutingHint {
    /// Broadcast to every shard (the default when no hint is given).
    None,
    /// Route only to the shard(s) owning these primary-key-shaped keys.
    ByKey { keys: Vec<String> },
    /// Route only to these pre-resolved micro-shard ids.
    ByMicroShards { micro_shards: Vec<u32> },
}

impl Default for RoutingHint {
    fn default() -> Self {
        RoutingHint::None
    }
}

/// `root_search` request (§6.1): what a client sends the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSearchRequest {
    pub query: SearchQuery,
    #[serde(default)]
    pub routing_hint: RoutingHint,
    /// Values for the names the query declares under `contextFeatures`
    /// (§4.1, §4.3.1): request-scoped scalars the caller already computed
    /// (e.g. a freshness weight), not anything stored in the index.
    #[serde(default)]
    pub context_features: HashMap<String, f64>,
}

/// A document identity the collector can sort/tie-break on, in absolute
/// (broker-visible) coordinates: `(shard_id, global_doc_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalDocId {
    pub shard_id: u32,
    pub global_doc_id: u64,
}

/// The encoded phased-sort key for one hit, plus the tie-breaking id
/// (§4.3.1). Comparing two `SortKeyValue`s lexicographically on
/// `components` then `doc_id` reproduces the user's requested ordering
/// exactly, and is also the `(shardId, globalDocId)` tie-break the broker's
/// k-way merge uses (§4.8.2).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SortKeyValue {
    pub components: Vec<u64>,
    pub doc_id: GlobalDocId,
}

/// A single hit as the client sees it, already hydrated (§4.4, §6.1).
/// Attached children are carried out-of-line in the enclosing response's
/// flat `children` pool (FLAT_NORMALIZED, §6.1): `child_document_offsets`
/// maps a foreign-key field name to indices into that pool rather than
/// nesting full `Hit`s inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub primary_key: String,
    pub global_doc_id: u64,
    pub shard_id: u32,
    pub score: f32,
    pub sort_key: SortKeyValue,
    pub fields: HashMap<String, FieldValue>,
    #[serde(default)]
    pub child_document_offsets: HashMap<String, Vec<usize>>,
    /// Populated when `query.groupBy` was set: the other members of this
    /// hit's group beyond the representative one (§4.3.3). Collapsed
    /// shard-local by the collector before hydration, so it only merges
    /// documents that land on the same shard; never flattened into
    /// `children`.
    #[serde(default)]
    pub group_members: Vec<Hit>,
}

/// One bucket of a term-count or histogram facet (§4.3.3, §4.8.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetResult {
    pub field: String,
    pub buckets: Vec<FacetBucket>,
}

/// `root_search` response (§6.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSearchResponse {
    pub total_hits: u64,
    pub documents: Vec<Hit>,
    /// Flat pool every `documents[i].child_document_offsets` indexes into.
    #[serde(default)]
    pub children: Vec<Hit>,
    pub facets: Vec<FacetResult>,
    /// `true` if `totalHits` is an estimate because at least one shard hit
    /// the facet-count threshold before scanning all of its matches (§4.3.3).
    pub facets_approximate: bool,
    /// Non-empty only when some, but not all, shards failed or timed out
    /// (§7, §4.8).
    pub failed_shards: Vec<u32>,
}

/// `leaf_search` request (§6.2): what the broker sends a searcher for one
/// shard. The query has already been planned and (partially) compiled by
/// the broker's Join Executor; the searcher finishes compiling it against
/// its own namespace and executes it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSearchRequest {
    pub shard_id: u32,
    pub query: SearchQuery,
    pub requires_scoring: bool,
    /// Values for `query.contextFeatures`, forwarded unchanged from the
    /// `RootSearchRequest` (§4.1, §4.3.1).
    #[serde(default)]
    pub context_features: HashMap<String, f64>,
}

/// `leaf_search` response (§6.2): already-hydrated hits, since this build
/// collapses the collector and hydrator into a single per-shard round trip
/// rather than a second `fetch_docs` call (§4.3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSearchResponse {
    pub shard_id: u32,
    pub total_hits: u64,
    pub hits: Vec<Hit>,
    #[serde(default)]
    pub children: Vec<Hit>,
    pub facets: Vec<FacetResult>,
    pub facets_approximate: bool,
}

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

//! The query execution core (§4–§8 of the design notes this crate
//! implements): a planned query becomes a compiled, per-shard segment scan
//! (compiler, join executor, collector, hydrator) served by a `Searcher`,
//! and a `Broker` fans a query out across shards and reduces the results
//! back into one page (dedup, merge, facet aggregation, reorder).

pub mod broker;
pub mod codec;
pub mod collector;
pub mod compiler;
pub mod config;
pub mod error;
pub mod hydrator;
pub mod join;
pub mod metrics;
pub mod searcher;
pub mod shard_selector;
pub mod transport;
pub mod wire;

pub use broker::{Broker, ShardingTable};
pub use config::{BrokerConfig, SearcherConfig};
pub use error::{Result, SearchError};
pub use searcher::{Searcher, SearcherContext, SearchService};
pub use transport::{InProcessTransport, ShardTransport};
pub use wire::{
    FacetBucket, FacetResult, GlobalDocId, Hit, LeafSearchRequest, LeafSearchResponse,
    RootSearchRequest, RootSearchResponse, RoutingHint, SortKeyValue,
};

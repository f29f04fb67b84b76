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

use lattice_common::metrics::{new_counter, new_histogram, new_histogram_vec, HistogramVec};
use once_cell::sync::Lazy;
use prometheus::{Histogram, IntCounter};

/// Process-wide search metrics, registered once on first use (§1.4).
pub struct SearchMetrics {
    pub leaf_search_requests_total: IntCounter,
    pub leaf_search_errors_total: IntCounter,
    pub root_search_requests_total: IntCounter,
    pub root_search_partial_total: IntCounter,
    pub leaf_search_duration_seconds: Histogram,
    pub root_search_duration_seconds: Histogram,
    /// Labeled by outcome (`"ok"` | `"timeout"` | `"error"`), used to break
    /// down per-shard fan-out results in the broker (§4.8).
    pub shard_fanout_duration_seconds: HistogramVec<1>,
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self {
            leaf_search_requests_total: new_counter(
                "leaf_search_requests_total",
                "Number of leaf_search calls served by this searcher.",
                "search",
            ),
            leaf_search_errors_total: new_counter(
                "leaf_search_errors_total",
                "Number of leaf_search calls that returned an error.",
                "search",
            ),
            root_search_requests_total: new_counter(
                "root_search_requests_total",
                "Number of root_search calls served by this broker.",
                "search",
            ),
            root_search_partial_total: new_counter(
                "root_search_partial_total",
                "Number of root_search calls that returned a partial result.",
                "search",
            ),
            leaf_search_duration_seconds: new_histogram(
                "leaf_search_duration_seconds",
                "Time spent executing a single leaf_search call.",
                "search",
            ),
            root_search_duration_seconds: new_histogram(
                "root_search_duration_seconds",
                "End-to-end time spent executing a root_search call.",
                "search",
            ),
            shard_fanout_duration_seconds: new_histogram_vec(
                "shard_fanout_duration_seconds",
                "Time spent waiting on a single shard during fan-out.",
                "search",
                ["outcome"],
            ),
        }
    }
}

pub static SEARCH_METRICS: Lazy<SearchMetrics> = Lazy::new(SearchMetrics::default);

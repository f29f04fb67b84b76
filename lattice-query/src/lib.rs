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

//! The search query AST and the planner that validates and rewrites it
//! (§4.1). Lowering a planned query into something a segment reader can
//! execute is `lattice-search`'s job.

pub mod ast;
pub mod error;
pub mod planner;

pub use ast::{
    Dedup, DedupPolicy, Filter, FacetKind, FacetSpec, GroupBy, Join, KeywordGroup, Keywords,
    Occur, PhasedSortKey, Reordering, SearchQuery, SortDirection, SortKey, VectorQuery,
};
pub use error::{InvalidQuery, QueryPath};
pub use planner::{Planner, PlannedQuery, SchemaRegistry};

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

//! Lowers a validated, planned query plus the Join Executor's inner
//! results into a segment-executable filter tree (§4.2). The compiled form
//! *is* a `Filter`: nothing downstream needs an intermediate
//! representation beyond the AST the planner already validated, since the
//! collector interprets `Filter` directly against a `SegmentReader`.

use std::collections::{HashMap, HashSet};

use lattice_query::{Filter, Occur, SearchQuery};
use lattice_schema::{FieldValue, Namespace};
use serde::{Deserialize, Serialize};

/// Hydrated results of one inner join query, keyed by its namespace, as
/// produced by the Join Executor (§4.5) before being folded into the outer
/// compiled query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InnerResult {
    pub primary_keys: Vec<String>,
    /// Field values extracted from the hydrated inner hits, keyed by field
    /// name, used to materialize `ReferenceFieldInSet` projections.
    pub field_values: HashMap<String, Vec<FieldValue>>,
}

pub type InnerResults = HashMap<String, InnerResult>;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("no foreign key on namespace `{namespace}` references `{child}`")]
    NoForeignKey { namespace: String, child: String },
    #[error("inner results for namespace `{0}` were not supplied")]
    MissingInnerResult(String),
}

/// Lowers `query.filter` into its compiled form, injecting a foreign-key
/// membership clause for each inner join namespace and materializing any
/// `ReferenceFieldInSet` filters against `inner_results` (§4.2). A missing
/// `query.filter` lowers to an empty `Boolean`, which the collector treats
/// as match-all rather than match-nothing.
pub fn compile(
    query: &SearchQuery,
    namespace: &Namespace,
    inner_results: &InnerResults,
) -> Result<Filter, CompileError> {
    let base = query
        .filter
        .clone()
        .unwrap_or(Filter::Boolean {
            clauses: vec![],
            min_should_match: 0,
        });
    let base = materialize_reference_fields(base, inner_results);

    let Some(join) = &query.join else {
        return Ok(base);
    };
    if join.inner_search_queries.is_empty() {
        return Ok(base);
    }

    let mut clauses = vec![(Occur::Filter, base)];
    for inner in &join.inner_search_queries {
        let fk = namespace
            .foreign_key_to(&inner.namespace)
            .ok_or_else(|| CompileError::NoForeignKey {
                namespace: namespace.name.clone(),
                child: inner.namespace.clone(),
            })?;
        let inner_result = inner_results
            .get(&inner.namespace)
            .ok_or_else(|| CompileError::MissingInnerResult(inner.namespace.clone()))?;
        let values: HashSet<String> = inner_result.primary_keys.iter().cloned().collect();
        clauses.push((
            Occur::Filter,
            Filter::TermInSet {
                field: fk.name.clone(),
                values: values.into_iter().map(FieldValue::String).collect(),
            },
        ));
    }

    Ok(Filter::Boolean {
        clauses,
        min_should_match: 0,
    })
}

/// Replaces every `ReferenceFieldInSet` leaf with a `TermInSet` drawn from
/// the matching inner result's projected field values (§4.2). Leaves the
/// filter untouched where no inner result applies — that case is a planner
/// bug, not something the compiler should paper over, but compiling
/// defensively here keeps a stray reference from poisoning the rest of an
/// otherwise-valid tree.
fn materialize_reference_fields(filter: Filter, inner_results: &InnerResults) -> Filter {
    match filter {
        Filter::ReferenceFieldInSet {
            field,
            ref_namespace,
            ref_field,
        } => {
            let values = inner_results
                .get(&ref_namespace)
                .and_then(|r| r.field_values.get(&ref_field))
                .cloned()
                .unwrap_or_default();
            // `FieldValue` doesn't derive `Eq`/`Hash` (geo points and vectors
            // carry floats), so dedup on each value's serialized form rather
            // than the value itself.
            let mut seen = HashSet::new();
            let deduped: Vec<FieldValue> = values
                .into_iter()
                .filter(|v| seen.insert(serde_json::to_string(v).unwrap_or_default()))
                .collect();
            Filter::TermInSet { field, values: deduped }
        }
        Filter::Boolean {
            clauses,
            min_should_match,
        } => Filter::Boolean {
            clauses: clauses
                .into_iter()
                .map(|(occur, child)| (occur, materialize_reference_fields(child, inner_results)))
                .collect(),
            min_should_match,
        },
        Filter::Vector {
            field,
            target,
            k,
            filter,
        } => Filter::Vector {
            field,
            target,
            k,
            filter: filter.map(|f| Box::new(materialize_reference_fields(*f, inner_results))),
        },
        other => other,
    }
}

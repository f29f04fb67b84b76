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

//! The Join Executor (§4.5). Resolution is per-shard (§3 Foreign key): a
//! query's inner joins are resolved entirely against the namespaces this
//! shard already holds, recursing into each inner query's own `join`
//! before that query is itself compiled and collected. A child that lives
//! on a different shard is simply absent from the result, never an error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lattice_query::ast::Filter;
use lattice_query::{SchemaRegistry, SearchQuery};
use lattice_schema::{FieldValue, IndexReader, Namespace};

use crate::collector::{self, Document, ForeignKeyBound};
use crate::compiler::{self, InnerResult, InnerResults};
use crate::config::SearcherConfig;
use crate::error::SearchError;

/// Child documents resolved for one query's joins, keyed by the foreign-key
/// field name on the parent namespace — exactly the shape `ForeignKeyBound`
/// needs, so the caller can build bounds without a second lookup.
pub type ForeignKeyBindings = HashMap<String, HashMap<String, Document>>;

/// Resolves every inner join `query` declares, recursing into each inner
/// query's own joins first so it can be compiled. Returns the compiler's
/// `InnerResults` (primary keys and projected field values) alongside the
/// raw child documents ready to become `ForeignKeyBound`s.
#[tracing::instrument(skip_all, fields(namespace = %namespace.name, depth))]
pub fn resolve(
    query: &SearchQuery,
    namespace: &Namespace,
    schema: &SchemaRegistry,
    indexes: &HashMap<String, Arc<dyn IndexReader>>,
    context_features: &HashMap<String, f64>,
    config: &SearcherConfig,
    depth: u32,
) -> Result<(InnerResults, ForeignKeyBindings), SearchError> {
    let mut inner_results = InnerResults::new();
    let mut bindings = ForeignKeyBindings::new();

    let Some(join) = &query.join else {
        return Ok((inner_results, bindings));
    };
    if join.inner_search_queries.is_empty() {
        return Ok((inner_results, bindings));
    }
    if depth >= config.max_join_depth {
        return Err(SearchError::JoinTooDeep {
            got: depth + 1,
            max: config.max_join_depth,
        });
    }

    for inner in &join.inner_search_queries {
        let Some(child_namespace) = schema.lookup(&inner.namespace) else {
            return Err(SearchError::Internal(format!(
                "join references unknown namespace `{}` (should have been caught by planning)",
                inner.namespace
            )));
        };
        let Some(child_index) = indexes.get(&inner.namespace) else {
            // Not present in this shard at all: no children from here.
            inner_results.insert(inner.namespace.clone(), InnerResult::default());
            continue;
        };

        let (nested_results, nested_bindings) =
            resolve(inner, child_namespace, schema, indexes, context_features, config, depth + 1)?;
        let compiled = compiler::compile(inner, child_namespace, &nested_results)
            .map_err(|err| SearchError::InvalidQuery(lattice_query::InvalidQuery::new("join", err.to_string())))?;
        let nested_bounds: Vec<ForeignKeyBound<'_>> = nested_bindings
            .iter()
            .map(|(field, map)| ForeignKeyBound {
                foreign_key_field: field.clone(),
                child_by_primary_key: map,
            })
            .collect();

        let requires_scoring =
            !inner.keywords.is_empty() || !inner.filter.as_ref().map(Filter::is_always_non_scoring).unwrap_or(true);

        let collected = collector::collect(
            inner,
            &compiled,
            child_index.as_ref(),
            requires_scoring,
            context_features,
            &nested_bounds,
            inner.total_hits_threshold,
        )
        .map_err(|err| SearchError::IoFailure(err.to_string()))?;

        if collected.total_hits > config.max_inner_join_cardinality {
            return Err(SearchError::JoinTooLarge(collected.total_hits));
        }

        let ref_fields = collect_ref_fields(query.filter.as_ref(), &inner.namespace);
        let mut field_values: HashMap<String, Vec<FieldValue>> = HashMap::new();
        for doc in &collected.documents {
            for field in &ref_fields {
                if let Some(segment) = child_index.leaves().get(doc.leaf_ord as usize) {
                    if let Some(value) = collector::field_value(segment.as_ref(), doc.leaf_doc_id, field) {
                        field_values.entry(field.clone()).or_default().push(value);
                    }
                }
            }
        }

        let by_primary_key: HashMap<String, Document> =
            collected.documents.iter().map(|d| (d.primary_key.clone(), d.clone())).collect();
        let primary_keys = by_primary_key.keys().cloned().collect();

        inner_results.insert(
            inner.namespace.clone(),
            InnerResult { primary_keys, field_values },
        );

        if let Some(fk) = namespace.foreign_key_to(&inner.namespace) {
            bindings.insert(fk.name.clone(), by_primary_key);
        }
    }

    Ok((inner_results, bindings))
}

/// Scans `filter` for `ReferenceFieldInSet` leaves pointing at `ref_namespace`,
/// collecting the set of `refField` names the compiler will need projected
/// field values for (§4.2, §4.5).
fn collect_ref_fields(filter: Option<&Filter>, ref_namespace: &str) -> HashSet<String> {
    fn walk(filter: &Filter, ref_namespace: &str, out: &mut HashSet<String>) {
        match filter {
            Filter::ReferenceFieldInSet {
                ref_namespace: ns,
                ref_field,
                ..
            } if ns == ref_namespace => {
                out.insert(ref_field.clone());
            }
            Filter::Boolean { clauses, .. } => {
                for (_, child) in clauses {
                    walk(child, ref_namespace, out);
                }
            }
            Filter::Vector { filter: Some(inner), .. } => walk(inner, ref_namespace, out),
            _ => {}
        }
    }

    let mut out = HashSet::new();
    if let Some(filter) = filter {
        walk(filter, ref_namespace, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use lattice_query::ast::{Dedup, Filter, Join, Keywords};
    use lattice_schema::testing::{FakeDoc, InMemoryIndexReader, InMemorySegment};
    use lattice_schema::{Container, FieldSchema, FieldType, ForeignKey};

    use super::*;

    fn item_namespace() -> Namespace {
        Namespace {
            name: "item".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![ForeignKey {
                name: "store_ref".to_string(),
                container: Container::Scalar,
                children: vec!["store".to_string()],
                required: false,
            }],
            fields: vec![FieldSchema {
                name: "store_ref".to_string(),
                field_type: FieldType::String,
                doc_value: true,
            }],
        }
    }

    fn store_namespace() -> Namespace {
        Namespace {
            name: "store".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![],
            fields: vec![FieldSchema {
                name: "region".to_string(),
                field_type: FieldType::String,
                doc_value: false,
            }],
        }
    }

    fn bare_query(namespace: &str, filter: Option<Filter>) -> SearchQuery {
        SearchQuery {
            namespace: namespace.to_string(),
            keywords: Keywords::default(),
            filter,
            join: None,
            group_by: None,
            facet: vec![],
            return_fields: vec![],
            context_features: vec![],
            phased_sort_by: vec![],
            dedup: Dedup::default(),
            reorderings: vec![],
            limit: 10,
            offset: 0,
            total_hits_threshold: None,
        }
    }

    #[test]
    fn resolves_child_on_same_shard_and_skips_absent_namespace() {
        let mut fields = HashMap::new();
        fields.insert("region".to_string(), FieldValue::String("west".to_string()));
        let store_index: Arc<dyn IndexReader> =
            Arc::new(InMemoryIndexReader::new(vec![InMemorySegment::new(vec![FakeDoc::new("s1", fields)])]));

        let mut indexes: HashMap<String, Arc<dyn IndexReader>> = HashMap::new();
        indexes.insert("store".to_string(), store_index);

        let item_ns = item_namespace();
        let store_ns = store_namespace();
        let schema = SchemaRegistry::new(vec![item_ns.clone(), store_ns]);

        let inner_query = bare_query(
            "store",
            Some(Filter::Term {
                field: "region".to_string(),
                value: FieldValue::String("west".to_string()),
            }),
        );
        let mut outer = bare_query("item", None);
        outer.join = Some(Join {
            inner_search_queries: vec![inner_query],
        });

        let (inner_results, bindings) = resolve(
            &outer,
            &item_ns,
            &schema,
            &indexes,
            &HashMap::new(),
            &SearcherConfig::default(),
            0,
        )
        .unwrap();

        assert_eq!(inner_results["store"].primary_keys, vec!["s1".to_string()]);
        assert_eq!(bindings["store_ref"].len(), 1);
        assert!(bindings["store_ref"].contains_key("s1"));
    }

    #[test]
    fn rejects_joins_deeper_than_configured_max() {
        let item_ns = item_namespace();
        let schema = SchemaRegistry::new(vec![item_ns.clone()]);
        let mut outer = bare_query("item", None);
        outer.join = Some(Join {
            inner_search_queries: vec![bare_query("store", None)],
        });
        let mut config = SearcherConfig::default();
        config.max_join_depth = 0;

        let err = resolve(&outer, &item_ns, &schema, &HashMap::new(), &HashMap::new(), &config, 0).unwrap_err();
        assert!(matches!(err, SearchError::JoinTooDeep { .. }));
    }
}

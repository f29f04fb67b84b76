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

//! The Searcher Service (§4.6): owns one shard's segments and serves
//! `leaf_search`, running the per-shard Query Engine pipeline — compile,
//! join resolution, collect, hydrate — behind a bounded concurrency gate
//! and a deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lattice_query::{SchemaRegistry, SearchQuery};
use lattice_schema::IndexReader;
use tokio::sync::Semaphore;

use crate::collector::{self, ForeignKeyBound};
use crate::compiler;
use crate::config::SearcherConfig;
use crate::error::SearchError;
use crate::hydrator::{self, ChildReturnFields};
use crate::join;
use crate::metrics::SEARCH_METRICS;
use crate::wire::{FacetBucket, FacetResult, LeafSearchRequest, LeafSearchResponse};

/// Per-shard knobs plus the semaphore that bounds how many `leaf_search`
/// calls run their segment work concurrently (§5, §9).
pub struct SearcherContext {
    pub config: SearcherConfig,
    semaphore: Arc<Semaphore>,
}

impl SearcherContext {
    pub fn new(config: SearcherConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_num_concurrent_split_searches.max(1)));
        Self { config, semaphore }
    }
}

/// The searcher-side RPC surface (§4.6, §6.2). Mirrors the teacher's
/// `SearchService` shape: a small async trait so the broker can hold
/// either a real in-process searcher or a mock in tests.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SearchService: Send + Sync {
    async fn leaf_search(&self, request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError>;
}

/// One shard's worth of segments, one `IndexReader` per namespace stored on
/// it (§3: "each namespace is stored in its own segmented index within a
/// shard").
pub struct Searcher {
    shard_id: u32,
    schema: Arc<SchemaRegistry>,
    indexes: HashMap<String, Arc<dyn IndexReader>>,
    context: Arc<SearcherContext>,
}

impl Searcher {
    pub fn new(
        shard_id: u32,
        schema: Arc<SchemaRegistry>,
        indexes: HashMap<String, Arc<dyn IndexReader>>,
        context: Arc<SearcherContext>,
    ) -> Self {
        Self {
            shard_id,
            schema,
            indexes,
            context,
        }
    }

    async fn run(&self, request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError> {
        let query = &request.query;
        let namespace = self
            .schema
            .lookup(&query.namespace)
            .ok_or_else(|| SearchError::Internal(format!("unknown namespace `{}`", query.namespace)))?;
        let index = self
            .indexes
            .get(&query.namespace)
            .ok_or_else(|| SearchError::ShardUnavailable(format!("namespace `{}` not on this shard", query.namespace)))?;

        let (inner_results, bindings) = join::resolve(
            query,
            namespace,
            &self.schema,
            &self.indexes,
            &request.context_features,
            &self.context.config,
            0,
        )?;
        let foreign_key_bounds: Vec<ForeignKeyBound<'_>> = bindings
            .iter()
            .map(|(field, map)| ForeignKeyBound {
                foreign_key_field: field.clone(),
                child_by_primary_key: map,
            })
            .collect();

        let compiled = compiler::compile(query, namespace, &inner_results)
            .map_err(|err| SearchError::Internal(err.to_string()))?;

        let collected = collector::collect(
            query,
            &compiled,
            index.as_ref(),
            request.requires_scoring,
            &request.context_features,
            &foreign_key_bounds,
            query.total_hits_threshold,
        )?;

        let child_return_fields: ChildReturnFields = query
            .join
            .iter()
            .flat_map(|j| &j.inner_search_queries)
            .filter_map(|inner| {
                namespace
                    .foreign_key_to(&inner.namespace)
                    .map(|fk| (fk.name.clone(), inner.return_fields.clone()))
            })
            .collect();

        let page = hydrator::hydrate(
            self.shard_id,
            collected.documents,
            index.as_ref(),
            &query.return_fields,
            &child_return_fields,
        );
        if page.dropped > 0 {
            tracing::warn!(shard_id = self.shard_id, dropped = page.dropped, "dropped documents that failed to hydrate");
        }

        let mut facets: Vec<FacetResult> = collected
            .facets
            .into_iter()
            .map(|(field, counts)| {
                let mut buckets: Vec<FacetBucket> =
                    counts.into_iter().map(|(key, count)| FacetBucket { key, count }).collect();
                buckets.sort_by(|a, b| a.key.cmp(&b.key));
                FacetResult { field, buckets }
            })
            .collect();
        facets.sort_by(|a, b| a.field.cmp(&b.field));

        Ok(LeafSearchResponse {
            shard_id: self.shard_id,
            total_hits: collected.total_hits,
            hits: page.hits,
            children: page.children,
            facets,
            facets_approximate: collected.facets_approximate,
        })
    }
}

#[async_trait]
impl SearchService for Searcher {
    #[tracing::instrument(name = "searcher_search", skip_all, fields(shard_id = self.shard_id, namespace = %request.query.namespace))]
    async fn leaf_search(&self, request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError> {
        SEARCH_METRICS.leaf_search_requests_total.inc();
        let start = Instant::now();

        let permit = tokio::time::timeout(self.context.config.overload_queue_timeout, self.context.semaphore.acquire())
            .await
            .map_err(|_| SearchError::Overloaded)?
            .map_err(|_| SearchError::Internal("searcher semaphore closed".to_string()))?;

        let result = tokio::time::timeout(self.context.config.request_deadline, self.run(request)).await;
        drop(permit);

        SEARCH_METRICS
            .leaf_search_duration_seconds
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                SEARCH_METRICS.leaf_search_errors_total.inc();
                Err(err)
            }
            Err(_) => {
                SEARCH_METRICS.leaf_search_errors_total.inc();
                Err(SearchError::DeadlineExceeded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use lattice_query::ast::{Dedup, Keywords};
    use lattice_schema::testing::{FakeDoc, InMemoryIndexReader, InMemorySegment};
    use lattice_schema::{FieldSchema, FieldType, FieldValue, Namespace};

    use super::*;

    fn namespace() -> Namespace {
        Namespace {
            name: "item".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![],
            fields: vec![FieldSchema {
                name: "title".to_string(),
                field_type: FieldType::String,
                doc_value: false,
            }],
        }
    }

    fn query() -> SearchQuery {
        SearchQuery {
            namespace: "item".to_string(),
            keywords: Keywords::default(),
            filter: None,
            join: None,
            group_by: None,
            facet: vec![],
            return_fields: vec!["title".to_string()],
            context_features: vec![],
            phased_sort_by: vec![],
            dedup: Dedup::default(),
            reorderings: vec![],
            limit: 10,
            offset: 0,
            total_hits_threshold: None,
        }
    }

    #[tokio::test]
    async fn leaf_search_hydrates_matches() {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), FieldValue::String("widget".to_string()));
        let index: Arc<dyn IndexReader> =
            Arc::new(InMemoryIndexReader::new(vec![InMemorySegment::new(vec![FakeDoc::new("p1", fields)])]));
        let mut indexes = HashMap::new();
        indexes.insert("item".to_string(), index);

        let schema = Arc::new(SchemaRegistry::new(vec![namespace()]));
        let context = Arc::new(SearcherContext::new(SearcherConfig::default()));
        let searcher = Searcher::new(0, schema, indexes, context);

        let response = searcher
            .leaf_search(LeafSearchRequest {
                shard_id: 0,
                query: query(),
                requires_scoring: false,
                context_features: HashMap::new(),
            })
            .await
            .unwrap();

        assert_eq!(response.total_hits, 1);
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].primary_key, "p1");
        assert_eq!(response.hits[0].fields.get("title"), Some(&FieldValue::String("widget".to_string())));
    }

    #[tokio::test]
    async fn leaf_search_rejects_unknown_namespace() {
        let schema = Arc::new(SchemaRegistry::new(vec![namespace()]));
        let context = Arc::new(SearcherContext::new(SearcherConfig::default()));
        let searcher = Searcher::new(0, schema, HashMap::new(), context);

        let mut bad_query = query();
        bad_query.namespace = "nope".to_string();
        let err = searcher
            .leaf_search(LeafSearchRequest {
                shard_id: 0,
                query: bad_query,
                requires_scoring: false,
                context_features: HashMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Internal(_)));
    }
}

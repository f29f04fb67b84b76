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

//! The Broker Orchestrator (§4.8): the single `root_search` entry point that
//! plans a query, selects shards, fans the leaf request out to them
//! concurrently, and reduces the per-shard responses into one page — dedup,
//! k-way merge, facet aggregation, then the L2 reorder pipeline.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use lattice_query::ast::{DedupPolicy, Reordering};
use lattice_query::{Planner, SearchQuery};
use lattice_schema::ShardingConfig;

use crate::config::BrokerConfig;
use crate::error::SearchError;
use crate::metrics::SEARCH_METRICS;
use crate::shard_selector;
use crate::transport::ShardTransport;
use crate::wire::{
    FacetBucket, FacetResult, Hit, LeafSearchRequest, LeafSearchResponse, RootSearchRequest,
    RootSearchResponse,
};

/// The broker's view of a namespace's sharding topology, keyed by namespace
/// name. A real deployment loads this from the same place it loads the
/// schema; this crate only needs the finished map (§1 — configuration
/// loading is an external collaborator).
pub type ShardingTable = HashMap<String, ShardingConfig>;

/// Owns everything one `root_search` call needs beyond the request itself:
/// the validating/rewriting `Planner`, per-namespace sharding topology, the
/// transport used to reach searchers, and broker-level knobs (§4.8, §5).
pub struct Broker {
    planner: Planner,
    sharding: ShardingTable,
    transport: Arc<dyn ShardTransport>,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(
        planner: Planner,
        sharding: ShardingTable,
        transport: Arc<dyn ShardTransport>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            planner,
            sharding,
            transport,
            config,
        }
    }

    #[tracing::instrument(name = "root_search", skip_all, fields(namespace = %request.query.namespace))]
    pub async fn root_search(&self, request: RootSearchRequest) -> Result<RootSearchResponse, SearchError> {
        SEARCH_METRICS.root_search_requests_total.inc();
        let start = Instant::now();
        let result = self.run(request).await;
        SEARCH_METRICS
            .root_search_duration_seconds
            .observe(start.elapsed().as_secs_f64());
        if let Ok(response) = &result {
            if !response.failed_shards.is_empty() {
                SEARCH_METRICS.root_search_partial_total.inc();
            }
        }
        result
    }

    async fn run(&self, request: RootSearchRequest) -> Result<RootSearchResponse, SearchError> {
        let planned = self.planner.plan(request.query)?;
        let query = planned.query;

        let sharding = self.sharding.get(&query.namespace).ok_or_else(|| {
            SearchError::ShardUnavailable(format!("no sharding configuration for namespace `{}`", query.namespace))
        })?;
        let shard_ids = shard_selector::resolve_shards(&request.routing_hint, sharding);
        if shard_ids.is_empty() {
            return Err(SearchError::ShardUnavailable(format!(
                "no shards available for namespace `{}`",
                query.namespace
            )));
        }

        let (responses, failed_shards) = self
            .fanout(&query, &shard_ids, planned.requires_scoring, &request.context_features)
            .await;

        let tolerance = shard_ids.len() / self.config.partial_failure_denominator.max(1);
        if failed_shards.len() > tolerance {
            tracing::warn!(
                failed = failed_shards.len(),
                total = shard_ids.len(),
                tolerance,
                "partial failure threshold exceeded"
            );
            return Err(SearchError::Partial {
                failed_shards: failed_shards.len(),
                total_shards: shard_ids.len(),
            });
        }
        if !failed_shards.is_empty() {
            tracing::info!(failed = ?failed_shards, "tolerating shard failures, response marked partial");
        }

        let total_hits: u64 = responses.iter().map(|r| r.total_hits).sum();

        let mut children: Vec<Hit> = Vec::new();
        let mut flat_hits: Vec<Hit> = Vec::new();
        for response in &responses {
            let base = children.len();
            for hit in &response.hits {
                let mut hit = hit.clone();
                for offsets in hit.child_document_offsets.values_mut() {
                    for offset in offsets.iter_mut() {
                        *offset += base;
                    }
                }
                flat_hits.push(hit);
            }
            children.extend(response.children.iter().cloned());
        }

        let deduped = dedup(flat_hits, query.dedup.policy);
        let capacity = (query.limit + query.offset).max(1) as usize;
        let mut merged = k_way_merge(deduped, capacity);

        apply_reorderings(
            &mut merged,
            &query.reorderings,
            &request.context_features,
            query.offset as usize,
            query.limit as usize,
            self.config.reorder_lookahead,
        );

        let facets_approximate = responses.iter().any(|r| r.facets_approximate);
        let facets = aggregate_facets(responses.iter().flat_map(|r| r.facets.iter()));

        let page: Vec<Hit> = merged
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        Ok(RootSearchResponse {
            total_hits,
            documents: page,
            children,
            facets,
            facets_approximate,
            failed_shards,
        })
    }

    /// Issues one `leaf_search` per selected shard, all concurrently, and
    /// waits for the whole group (§5 "Broker fanout"). Each call is bounded
    /// by the broker's own deadline independent of whatever deadline the
    /// searcher applies internally, so a shard that never replies doesn't
    /// hang the request.
    async fn fanout(
        &self,
        query: &SearchQuery,
        shard_ids: &[u32],
        requires_scoring: bool,
        context_features: &HashMap<String, f64>,
    ) -> (Vec<LeafSearchResponse>, Vec<u32>) {
        let deadline = self.config.request_deadline;
        let tasks = shard_ids.iter().map(|&shard_id| {
            let transport = Arc::clone(&self.transport);
            let request = LeafSearchRequest {
                shard_id,
                query: query.clone(),
                requires_scoring,
                context_features: context_features.clone(),
            };
            async move {
                let shard_start = Instant::now();
                let outcome = match tokio::time::timeout(deadline, transport.leaf_search(shard_id, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::DeadlineExceeded),
                };
                let label = match &outcome {
                    Ok(_) => "ok",
                    Err(SearchError::DeadlineExceeded) => "timeout",
                    Err(_) => "error",
                };
                SEARCH_METRICS
                    .shard_fanout_duration_seconds
                    .with_label_values([label])
                    .observe(shard_start.elapsed().as_secs_f64());
                (shard_id, outcome)
            }
        });

        let mut responses = Vec::with_capacity(shard_ids.len());
        let mut failed_shards = Vec::new();
        for (shard_id, outcome) in join_all(tasks).await {
            match outcome {
                Ok(response) => responses.push(response),
                Err(err) => {
                    tracing::warn!(shard_id, error = %err, "shard failed during fan-out");
                    failed_shards.push(shard_id);
                }
            }
        }
        failed_shards.sort_unstable();
        (responses, failed_shards)
    }
}

/// Collapses hits sharing a primary key into one, per `policy` (§4.8.1).
fn dedup(hits: Vec<Hit>, policy: DedupPolicy) -> Vec<Hit> {
    match policy {
        DedupPolicy::None => hits,
        DedupPolicy::FirstSeen => {
            let mut seen = std::collections::HashSet::new();
            hits.into_iter().filter(|hit| seen.insert(hit.primary_key.clone())).collect()
        }
        DedupPolicy::MaxScore => {
            let mut best: HashMap<String, Hit> = HashMap::new();
            for hit in hits {
                match best.entry(hit.primary_key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(hit);
                    }
                    Entry::Occupied(mut slot) => {
                        if is_better_max_score_candidate(&hit, slot.get()) {
                            slot.insert(hit);
                        }
                    }
                }
            }
            best.into_values().collect()
        }
    }
}

/// `MaxScore` keeps the highest score; ties resolve to the lowest shard id,
/// then the lowest `globalDocId` (§4.8.1).
fn is_better_max_score_candidate(candidate: &Hit, incumbent: &Hit) -> bool {
    match candidate.score.partial_cmp(&incumbent.score) {
        Some(Ordering::Greater) => true,
        Some(Ordering::Less) => false,
        _ => (candidate.shard_id, candidate.global_doc_id) < (incumbent.shard_id, incumbent.global_doc_id),
    }
}

/// Merges every shard's already-sorted hit list into one ordering (§4.8.2).
/// Each input list is at most `limit+offset` long and pre-sorted by the
/// same `(sortKey, shardId, globalDocId)` total order the collector used, so
/// a full sort-then-truncate over the concatenation reproduces exactly what
/// a bounded min-heap merge over the per-shard streams would yield, with
/// less bookkeeping for the finite, already-materialized lists this broker
/// works with.
fn k_way_merge(mut hits: Vec<Hit>, capacity: usize) -> Vec<Hit> {
    hits.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
    hits.truncate(capacity);
    hits
}

/// Sums facet bucket counts across shards for matching `(field, value)`
/// pairs (§4.8.3).
fn aggregate_facets<'a>(facets: impl Iterator<Item = &'a FacetResult>) -> Vec<FacetResult> {
    let mut merged: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for facet in facets {
        let counts = merged.entry(facet.field.clone()).or_default();
        for bucket in &facet.buckets {
            *counts.entry(bucket.key.clone()).or_insert(0) += bucket.count;
        }
    }
    let mut out: Vec<FacetResult> = merged
        .into_iter()
        .map(|(field, counts)| {
            let mut buckets: Vec<FacetBucket> = counts.into_iter().map(|(key, count)| FacetBucket { key, count }).collect();
            buckets.sort_by(|a, b| a.key.cmp(&b.key));
            FacetResult { field, buckets }
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

/// Runs the L2 reorder pipeline over the current page plus a lookahead
/// window (§4.8.4), then re-sorts just that window by the (possibly
/// adjusted) score so a rule that boosts a doc's score actually changes its
/// position — otherwise a score-only mutation would be invisible to the
/// client reading `documents` in order.
fn apply_reorderings(
    hits: &mut [Hit],
    rules: &[Reordering],
    context_features: &HashMap<String, f64>,
    offset: usize,
    limit: usize,
    lookahead: u32,
) {
    if rules.is_empty() {
        return;
    }
    let window_end = offset.saturating_add(limit).saturating_add(lookahead as usize).min(hits.len());
    let window = &mut hits[..window_end];
    for hit in window.iter_mut() {
        for rule in rules {
            apply_rule(hit, rule, context_features);
        }
    }
    window.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.sort_key.doc_id.cmp(&b.sort_key.doc_id))
    });
}

fn apply_rule(hit: &mut Hit, rule: &Reordering, context_features: &HashMap<String, f64>) {
    match rule {
        Reordering::BoostByContextFeature { context_feature, weight } => {
            if context_features.contains_key(context_feature) {
                hit.score *= *weight as f32;
            }
        }
        Reordering::ClampScore { min, max } => {
            hit.score = hit.score.clamp(*min as f32, *max as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use lattice_query::ast::{Dedup, Keywords};
    use lattice_query::planner::SchemaRegistry;
    use lattice_schema::{FieldSchema, FieldType, Namespace};

    use super::*;
    use crate::wire::{GlobalDocId, RoutingHint, SortKeyValue};

    fn namespace() -> Namespace {
        Namespace {
            name: "item".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![],
            fields: vec![FieldSchema {
                name: "score_field".to_string(),
                field_type: FieldType::Double,
                doc_value: true,
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
            return_fields: vec![],
            context_features: vec![],
            phased_sort_by: vec![],
            dedup: Dedup::default(),
            reorderings: vec![],
            limit: 3,
            offset: 0,
            total_hits_threshold: None,
        }
    }

    fn hit(primary_key: &str, shard_id: u32, global_doc_id: u64, sort_component: u64, score: f32) -> Hit {
        Hit {
            primary_key: primary_key.to_string(),
            global_doc_id,
            shard_id,
            score,
            sort_key: SortKeyValue {
                components: vec![sort_component],
                doc_id: GlobalDocId { shard_id, global_doc_id },
            },
            fields: HashMap::new(),
            child_document_offsets: HashMap::new(),
            group_members: vec![],
        }
    }

    struct StubTransport {
        responses: HashMap<u32, LeafSearchResponse>,
    }

    #[async_trait]
    impl ShardTransport for StubTransport {
        async fn leaf_search(&self, shard_id: u32, _request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError> {
            self.responses
                .get(&shard_id)
                .cloned()
                .ok_or_else(|| SearchError::ShardUnavailable(format!("shard {shard_id}")))
        }
    }

    fn response(shard_id: u32, hits: Vec<Hit>) -> LeafSearchResponse {
        LeafSearchResponse {
            shard_id,
            total_hits: hits.len() as u64,
            hits,
            children: vec![],
            facets: vec![],
            facets_approximate: false,
        }
    }

    #[test]
    fn dedup_max_score_breaks_ties_on_shard_then_doc_id() {
        let hits = vec![hit("p", 1, 5, 0, 5.0), hit("p", 0, 5, 0, 5.0)];
        let result = dedup(hits, DedupPolicy::MaxScore);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].shard_id, 0);
    }

    #[test]
    fn dedup_max_score_prefers_strictly_higher_score() {
        let hits = vec![hit("p", 0, 1, 0, 3.0), hit("p", 1, 2, 0, 9.0)];
        let result = dedup(hits, DedupPolicy::MaxScore);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].shard_id, 1);
    }

    #[test]
    fn dedup_first_seen_keeps_merge_order() {
        let hits = vec![hit("p", 0, 1, 0, 3.0), hit("p", 1, 2, 0, 9.0)];
        let result = dedup(hits, DedupPolicy::FirstSeen);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].shard_id, 0);
    }

    #[test]
    fn k_way_merge_orders_by_sort_key_then_shard_then_doc_id() {
        let hits = vec![hit("a", 0, 1, 10, 0.0), hit("b", 1, 2, 5, 0.0), hit("c", 0, 3, 5, 0.0)];
        let merged = k_way_merge(hits, 10);
        assert_eq!(merged.iter().map(|h| h.primary_key.as_str()).collect::<Vec<_>>(), vec!["c", "b", "a"]);
    }

    #[test]
    fn k_way_merge_truncates_to_capacity() {
        let hits = vec![hit("a", 0, 1, 1, 0.0), hit("b", 0, 2, 2, 0.0), hit("c", 0, 3, 3, 0.0)];
        let merged = k_way_merge(hits, 2);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn reorder_boosts_and_resorts_within_lookahead() {
        let mut hits = vec![hit("a", 0, 1, 0, 1.0), hit("b", 0, 2, 0, 2.0)];
        let mut context = HashMap::new();
        context.insert("freshness".to_string(), 1.0);
        let rules = vec![Reordering::BoostByContextFeature {
            context_feature: "freshness".to_string(),
            weight: 10.0,
        }];
        apply_reorderings(&mut hits, &rules, &context, 0, 2, 0);
        assert_eq!(hits[0].primary_key, "a");
        assert_eq!(hits[0].score, 10.0);
    }

    #[test]
    fn clamp_score_bounds_the_range() {
        let mut hits = vec![hit("a", 0, 1, 0, 100.0)];
        let rules = vec![Reordering::ClampScore { min: 0.0, max: 5.0 }];
        apply_reorderings(&mut hits, &rules, &HashMap::new(), 0, 1, 0);
        assert_eq!(hits[0].score, 5.0);
    }

    #[tokio::test]
    async fn scatter_two_shards_merges_by_score_desc() {
        // S1 from the design notes: two shards, no routing hint, sort by
        // score descending, limit 3.
        let shard0 = response(0, vec![hit("A", 0, 0, u64::MAX - 10, 10.0), hit("B", 0, 1, u64::MAX - 6, 6.0)]);
        let shard1 = response(1, vec![hit("C", 1, 0, u64::MAX - 9, 9.0), hit("D", 1, 1, u64::MAX - 7, 7.0)]);
        let mut responses = HashMap::new();
        responses.insert(0, shard0);
        responses.insert(1, shard1);
        let transport = Arc::new(StubTransport { responses });

        let mut sharding = ShardingTable::new();
        sharding.insert("item".to_string(), ShardingConfig::new(2, 2).unwrap());

        let planner = Planner::new(SchemaRegistry::new(vec![namespace()]));
        let broker = Broker::new(planner, sharding, transport, BrokerConfig::default());

        let response = broker
            .root_search(RootSearchRequest {
                query: query(),
                routing_hint: RoutingHint::None,
                context_features: HashMap::new(),
            })
            .await
            .unwrap();

        assert_eq!(
            response.documents.iter().map(|h| h.primary_key.as_str()).collect::<Vec<_>>(),
            vec!["A", "C", "D"]
        );
        assert!(response.failed_shards.is_empty());
    }

    #[tokio::test]
    async fn partial_failure_within_tolerance_marks_response_partial() {
        let mut responses = HashMap::new();
        responses.insert(0, response(0, vec![hit("A", 0, 0, 1, 1.0)]));
        responses.insert(1, response(1, vec![hit("B", 1, 0, 2, 1.0)]));
        // shard 2 is never registered with the stub transport, so it fails.
        let transport = Arc::new(StubTransport { responses });

        let mut sharding = ShardingTable::new();
        sharding.insert("item".to_string(), ShardingConfig::new(3, 3).unwrap());

        let planner = Planner::new(SchemaRegistry::new(vec![namespace()]));
        let broker = Broker::new(planner, sharding, transport, BrokerConfig::default());

        let response = broker
            .root_search(RootSearchRequest {
                query: query(),
                routing_hint: RoutingHint::None,
                context_features: HashMap::new(),
            })
            .await
            .unwrap();

        assert_eq!(response.failed_shards, vec![2]);
    }

    #[tokio::test]
    async fn exceeding_failure_tolerance_is_a_fatal_partial_failure() {
        let mut responses = HashMap::new();
        responses.insert(0, response(0, vec![hit("A", 0, 0, 1, 1.0)]));
        // shards 1 and 2 both fail, exceeding floor(3/2) = 1.
        let transport = Arc::new(StubTransport { responses });

        let mut sharding = ShardingTable::new();
        sharding.insert("item".to_string(), ShardingConfig::new(3, 3).unwrap());

        let planner = Planner::new(SchemaRegistry::new(vec![namespace()]));
        let broker = Broker::new(planner, sharding, transport, BrokerConfig::default());

        let err = broker
            .root_search(RootSearchRequest {
                query: query(),
                routing_hint: RoutingHint::None,
                context_features: HashMap::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Partial { .. }));
    }
}

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

//! Where the teacher hard-codes its broker/searcher split behind a gRPC
//! (`tonic`) client, this crate exposes the same seam as a plain trait so
//! the split is real and testable without a network (§0 of the design
//! notes). `InProcessTransport` is the one implementation shipped here; a
//! networked one would live in a separate crate behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SearchError;
use crate::searcher::SearchService;
use crate::wire::{LeafSearchRequest, LeafSearchResponse};

/// The broker's view of "somewhere that can run `leaf_search` for a shard".
#[async_trait]
pub trait ShardTransport: Send + Sync {
    async fn leaf_search(&self, shard_id: u32, request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError>;
}

/// Dispatches directly to an in-process `SearchService` by shard id. Used
/// both in tests and as the only transport this workspace ships, since the
/// broker and searcher here run in the same process.
pub struct InProcessTransport {
    searchers: HashMap<u32, Arc<dyn SearchService>>,
}

impl InProcessTransport {
    pub fn new(searchers: HashMap<u32, Arc<dyn SearchService>>) -> Self {
        Self { searchers }
    }
}

#[async_trait]
impl ShardTransport for InProcessTransport {
    async fn leaf_search(&self, shard_id: u32, request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError> {
        let searcher = self
            .searchers
            .get(&shard_id)
            .ok_or_else(|| SearchError::ShardUnavailable(format!("no searcher registered for shard {shard_id}")))?;
        searcher.leaf_search(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use super::*;

    struct StubSearcher(u32);

    #[async_trait]
    impl SearchService for StubSearcher {
        async fn leaf_search(&self, request: LeafSearchRequest) -> Result<LeafSearchResponse, SearchError> {
            Ok(LeafSearchResponse {
                shard_id: self.0,
                total_hits: 0,
                hits: vec![],
                children: vec![],
                facets: vec![],
                facets_approximate: false,
            })
            .map(|mut r| {
                r.shard_id = request.shard_id;
                r
            })
        }
    }

    #[tokio::test]
    async fn routes_to_the_requested_shard() {
        let mut searchers: StdHashMap<u32, Arc<dyn SearchService>> = StdHashMap::new();
        searchers.insert(0, Arc::new(StubSearcher(0)));
        searchers.insert(1, Arc::new(StubSearcher(1)));
        let transport = InProcessTransport::new(searchers);

        let response = transport
            .leaf_search(
                1,
                LeafSearchRequest {
                    shard_id: 1,
                    query: test_query(),
                    requires_scoring: false,
                    context_features: StdHashMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.shard_id, 1);
    }

    #[tokio::test]
    async fn rejects_unknown_shard() {
        let transport = InProcessTransport::new(StdHashMap::new());
        let err = transport
            .leaf_search(
                7,
                LeafSearchRequest {
                    shard_id: 7,
                    query: test_query(),
                    requires_scoring: false,
                    context_features: StdHashMap::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::ShardUnavailable(_)));
    }

    fn test_query() -> lattice_query::SearchQuery {
        lattice_query::SearchQuery {
            namespace: "item".to_string(),
            keywords: lattice_query::ast::Keywords::default(),
            filter: None,
            join: None,
            group_by: None,
            facet: vec![],
            return_fields: vec![],
            context_features: vec![],
            phased_sort_by: vec![],
            dedup: lattice_query::ast::Dedup::default(),
            reorderings: vec![],
            limit: 10,
            offset: 0,
            total_hits_threshold: None,
        }
    }
}

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

use lattice_common::error::ErrorCategory;
use lattice_common::ServiceError;
use lattice_query::InvalidQuery;
use lattice_schema::ReaderError;
use thiserror::Error;

/// The error taxonomy for the search core (§7). Every leaf and broker
/// operation returns one of these; `ServiceError::category` is what the
/// wire codec and HTTP front door map to status codes.
#[derive(Debug, Error, Clone)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] InvalidQuery),

    #[error("shard unavailable: {0}")]
    ShardUnavailable(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,

    #[error("too many concurrent requests, try again later")]
    Overloaded,

    #[error("join produced more than the allowed number of inner results: {0}")]
    JoinTooLarge(u64),

    #[error("join depth {got} exceeds the configured maximum of {max}")]
    JoinTooDeep { got: u32, max: u32 },

    #[error("I/O failure reading segment: {0}")]
    IoFailure(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Some, but not all, shards failed or timed out; the response carries
    /// a partial result alongside the list of failed shard ids (§7, §4.8).
    #[error("partial failure across {failed_shards} of {total_shards} shards")]
    Partial {
        failed_shards: usize,
        total_shards: usize,
    },
}

impl From<ReaderError> for SearchError {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::SnapshotUnavailable(msg) => SearchError::ShardUnavailable(msg),
            other => SearchError::IoFailure(other.to_string()),
        }
    }
}

impl ServiceError for SearchError {
    fn category(&self) -> ErrorCategory {
        match self {
            SearchError::InvalidQuery(_) => ErrorCategory::BadRequest,
            SearchError::ShardUnavailable(_) => ErrorCategory::Unavailable,
            SearchError::DeadlineExceeded => ErrorCategory::DeadlineExceeded,
            SearchError::Cancelled => ErrorCategory::Cancelled,
            SearchError::Overloaded => ErrorCategory::RateLimited,
            SearchError::JoinTooLarge(_) => ErrorCategory::BadRequest,
            SearchError::JoinTooDeep { .. } => ErrorCategory::BadRequest,
            SearchError::IoFailure(_) => ErrorCategory::Internal,
            SearchError::Internal(_) => ErrorCategory::Internal,
            SearchError::Partial { .. } => ErrorCategory::Partial,
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

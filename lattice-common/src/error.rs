use std::fmt;

/// A coarse category every outward-facing error can be bucketed into.
///
/// Mirrors the shape of a gRPC/HTTP status bridge, even though none of the
/// crates in this workspace open a socket: call sites still need a stable
/// way to decide "is this retryable", "is this the client's fault", and so
/// on, without matching on every concrete error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself was malformed or violated a documented contract.
    BadRequest,
    /// A resource named by the request does not exist or is not ready.
    NotFound,
    /// The callee is temporarily unable to serve the request; retry later.
    Unavailable,
    /// The callee shed load; retry with backoff.
    RateLimited,
    /// The request did not complete before its deadline.
    DeadlineExceeded,
    /// The request was cancelled by the caller or an ancestor task.
    Cancelled,
    /// Some shards/segments contributed, some did not.
    Partial,
    /// Anything else: a bug, or a failure with no more specific category.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::BadRequest => "bad_request",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::DeadlineExceeded => "deadline_exceeded",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Partial => "partial",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Implemented by every error type that crosses a service boundary
/// (searcher <-> broker <-> client) so the caller can classify failures
/// uniformly regardless of which component raised them.
pub trait ServiceError: std::error::Error {
    fn category(&self) -> ErrorCategory;

    /// Whether retrying the same request against the same target is
    /// expected to help. Cancellation and bad requests are never retryable.
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Unavailable | ErrorCategory::RateLimited
        )
    }
}

impl ServiceError for std::convert::Infallible {
    fn category(&self) -> ErrorCategory {
        unreachable!("Infallible has no values")
    }
}

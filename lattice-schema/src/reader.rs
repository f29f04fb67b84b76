use std::collections::HashSet;
use std::ops::Bound;

use thiserror::Error;

use crate::value::FieldValue;

/// Errors the segmented-index read port can raise. Callers translate these
/// into the query core's own error taxonomy (`IndexUnavailable` for
/// snapshot-level failures, `IOFailure` for per-document ones).
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("field {field} is not of the expected kind for this operation")]
    WrongFieldKind { field: String },
    #[error("I/O error reading segment: {0}")]
    Io(String),
    #[error("index snapshot unavailable: {0}")]
    SnapshotUnavailable(String),
}

/// A stream of matching local doc ids within one segment, in increasing
/// order. Boxed rather than a concrete iterator type because each backing
/// primitive (postings list, range scan, geo scan) produces it differently.
pub type DocIdStream<'a> = Box<dyn Iterator<Item = u32> + Send + 'a>;

/// Per-segment sorted-set doc-value column: each document maps to zero or
/// more ordinals, each ordinal resolving to a string value. This is the
/// column foreign keys are stored in for ordinal iteration without loading
/// stored fields (§3 Foreign key, §4.3.2 Child binding).
pub trait SortedSetDocValues: Send + Sync {
    /// Ordinals present for `doc_id`, in the column's native order.
    fn ordinals(&self, doc_id: u32) -> Vec<u32>;
    /// Resolves an ordinal produced by `ordinals` to its string value.
    fn value_for_ordinal(&self, ord: u32) -> Option<&str>;
}

/// Per-segment single-valued numeric doc-value column (used for sort keys,
/// range filters resolved via doc values, and context features).
pub trait NumericDocValues: Send + Sync {
    fn get(&self, doc_id: u32) -> Option<f64>;
}

/// Per-segment single-valued binary doc-value column.
pub trait BinaryDocValues: Send + Sync {
    fn get(&self, doc_id: u32) -> Option<&[u8]>;
}

/// Stored-field access for hydration (§4.4): row-oriented, fetched by local
/// doc id, restricted to the requested field set to avoid over-reading.
pub trait StoredFieldsReader: Send + Sync {
    fn document(
        &self,
        leaf_doc_id: u32,
        fields: &HashSet<String>,
    ) -> Result<std::collections::HashMap<String, FieldValue>, ReaderError>;
}

/// One immutable segment within a shard's reader (§3 Index snapshot, §6.3).
/// Every method here is a read against data the external ingestion pipeline
/// already committed; none of them mutate anything.
pub trait SegmentReader: Send + Sync {
    fn num_docs(&self) -> u32;

    /// Matching doc ids for an exact term on `field`.
    fn postings(&self, field: &str, term: &FieldValue) -> Result<DocIdStream<'_>, ReaderError>;

    /// All distinct terms present for `field`, for planner-time existence
    /// checks and for facet enumeration.
    fn terms_enum(&self, field: &str) -> Result<Box<dyn Iterator<Item = String> + '_>, ReaderError>;

    /// Doc ids whose value for `field` falls in `[lo, hi]` (inclusive
    /// bounds are the caller's responsibility to express via `Bound`).
    fn range_stream(
        &self,
        field: &str,
        lo: Bound<FieldValue>,
        hi: Bound<FieldValue>,
    ) -> Result<DocIdStream<'_>, ReaderError>;

    /// Doc ids within `radius_meters` of `center` for a geo-point field.
    fn geo_stream(
        &self,
        field: &str,
        center: (f64, f64),
        radius_meters: f64,
    ) -> Result<DocIdStream<'_>, ReaderError>;

    /// Approximate nearest-neighbor search over a dense-vector field,
    /// optionally restricted to doc ids present in `prefilter`.
    fn vector_top_k(
        &self,
        field: &str,
        target: &[f32],
        k: usize,
        prefilter: Option<&[u32]>,
    ) -> Result<Vec<(u32, f32)>, ReaderError>;

    fn sorted_set_doc_values(&self, field: &str) -> Result<Box<dyn SortedSetDocValues + '_>, ReaderError>;
    fn numeric_doc_values(&self, field: &str) -> Result<Box<dyn NumericDocValues + '_>, ReaderError>;
    fn binary_doc_values(&self, field: &str) -> Result<Box<dyn BinaryDocValues + '_>, ReaderError>;

    fn stored_fields(&self) -> &dyn StoredFieldsReader;

    /// The primary-key value for a local doc id, used to enforce and check
    /// the per-shard primary-key uniqueness invariant (§3).
    fn primary_key(&self, leaf_doc_id: u32) -> Option<&str>;

    /// The similarity contribution of a single term match for `doc_id`.
    /// BM25 (or whatever function the underlying engine uses) is a
    /// black-box per spec.md's Non-goals; this hook is the narrow seam
    /// through which that black box's output reaches the collector. The
    /// default stands in with a constant contribution, which is enough to
    /// exercise ranking/tie-break logic without modeling term statistics.
    fn term_score(&self, _field: &str, _term: &FieldValue, _doc_id: u32) -> f32 {
        1.0
    }
}

/// A shard's read view: an ordered list of segments with stable ordinals
/// and the base global-doc-id offset for each (§3 Index snapshot, §6.3).
pub trait IndexReader: Send + Sync {
    fn leaves(&self) -> &[std::sync::Arc<dyn SegmentReader>];
    fn base_of(&self, leaf_ord: u32) -> u64;
}

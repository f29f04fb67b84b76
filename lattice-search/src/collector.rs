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

//! The per-shard Match+Rank Collector (§4.3): walks each segment's
//! matching doc-id stream, scores and sort-keys every match, keeps a
//! bounded top-K, binds child documents, and accumulates facets.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use lattice_query::ast::{FacetKind, GroupBy, SortDirection, SortKey};
use lattice_query::{Filter, Occur, PhasedSortKey, SearchQuery};
use lattice_schema::{FieldValue, IndexReader, ReaderError, SegmentReader};

/// A shallow in-flight candidate (§3 Document in-flight): identity and
/// ranking data only. Field payload is filled in later by the hydrator.
#[derive(Debug, Clone)]
pub struct Document {
    pub leaf_ord: u32,
    pub leaf_doc_id: u32,
    pub global_doc_id: u64,
    pub primary_key: String,
    pub score: f32,
    pub sort_key: Vec<u64>,
    /// Children bound in via a `ForeignKeyBound` (§4.3.2), keyed by the
    /// foreign key field that produced them.
    pub children: HashMap<String, Vec<Document>>,
    /// Other documents collapsed into this one because they shared this
    /// shard's `groupBy` field value (§4.3.3). Empty unless `query.groupBy`
    /// was set and this document won the representative slot for its
    /// group.
    pub group_members: Vec<Document>,
}

/// Binds a foreign-key sorted-set column to the child documents a prior
/// inner-query execution already resolved, so the collector can attach
/// children without a second index round-trip (§4.3.2).
pub struct ForeignKeyBound<'a> {
    pub foreign_key_field: String,
    pub child_by_primary_key: &'a HashMap<String, Document>,
}

/// Converts an `f64` to a `u64` that preserves ascending numeric order,
/// generalizing the bit-trick from Lemire's order-preserving float-to-int
/// encoding to `f64`, with an explicit NaN sentinel the original trick
/// doesn't need: NaN never compares meaningfully, so it is pinned to
/// `u64::MAX` and excluded from the invertible range used for `Desc`.
fn f64_to_u64(value: f64) -> u64 {
    if value.is_nan() {
        return u64::MAX;
    }
    let bits = value.to_bits();
    let mask = if bits & (1 << 63) != 0 { !bits } else { bits | (1 << 63) };
    let encoded = mask;
    encoded.min(u64::MAX - 1)
}

const MISSING_SENTINEL: u64 = u64::MAX;

/// Encodes one component of the phased sort tuple (§4.3.1). Missing or NaN
/// values always sort last, regardless of `direction`.
fn encode_component(value: Option<f64>, direction: SortDirection) -> u64 {
    match value {
        None => MISSING_SENTINEL,
        Some(v) if v.is_nan() => MISSING_SENTINEL,
        Some(v) => {
            let base = f64_to_u64(v);
            match direction {
                SortDirection::Asc => base,
                SortDirection::Desc => u64::MAX - 1 - base,
            }
        }
    }
}

/// Resolves one sort key's value for a document, independent of encoding,
/// so scoring and doc-value lookups share a single code path.
fn sort_key_raw_value(
    key: &SortKey,
    segment: &dyn SegmentReader,
    leaf_doc_id: u32,
    score: f32,
    context_features: &HashMap<String, f64>,
) -> Option<f64> {
    match key {
        SortKey::Score => Some(score as f64),
        SortKey::DocId => Some(leaf_doc_id as f64),
        SortKey::ContextFeature { name } => context_features.get(name).copied(),
        SortKey::Field { name } => segment
            .numeric_doc_values(name)
            .ok()
            .and_then(|dv| dv.get(leaf_doc_id)),
    }
}

fn compute_sort_tuple(
    phased_sort_by: &[PhasedSortKey],
    segment: &dyn SegmentReader,
    leaf_doc_id: u32,
    score: f32,
    context_features: &HashMap<String, f64>,
) -> Vec<u64> {
    phased_sort_by
        .iter()
        .map(|psk| {
            let raw = sort_key_raw_value(&psk.key, segment, leaf_doc_id, score, context_features);
            encode_component(raw, psk.direction)
        })
        .collect()
}

/// A facet accumulator (§4.3.3). `TermCount` sums occurrences per distinct
/// term; `Histogram` buckets a numeric field into the configured half-open
/// boundaries.
pub struct FacetAccumulator {
    pub field: String,
    kind: FacetKind,
    buckets: Vec<f64>,
    counts: HashMap<String, u64>,
    scanned: u64,
}

impl FacetAccumulator {
    pub fn new(field: String, kind: FacetKind, buckets: Vec<f64>) -> Self {
        Self {
            field,
            kind,
            buckets,
            counts: HashMap::new(),
            scanned: 0,
        }
    }

    fn accumulate(&mut self, segment: &dyn SegmentReader, leaf_doc_id: u32) {
        self.scanned += 1;
        match self.kind {
            FacetKind::TermCount => {
                if let Ok(sorted_set) = segment.sorted_set_doc_values(&self.field) {
                    for ord in sorted_set.ordinals(leaf_doc_id) {
                        if let Some(value) = sorted_set.value_for_ordinal(ord) {
                            *self.counts.entry(value.to_string()).or_insert(0) += 1;
                        }
                    }
                }
            }
            FacetKind::Histogram => {
                if let Ok(numeric) = segment.numeric_doc_values(&self.field) {
                    if let Some(value) = numeric.get(leaf_doc_id) {
                        let bucket = bucket_for(&self.buckets, value);
                        *self.counts.entry(bucket).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    pub fn into_counts(self) -> HashMap<String, u64> {
        self.counts
    }
}

fn bucket_for(boundaries: &[f64], value: f64) -> String {
    let mut lo = None;
    for hi in boundaries {
        if value < *hi {
            return match lo {
                Some(lo) => format!("[{lo},{hi})"),
                None => format!("(-inf,{hi})"),
            };
        }
        lo = Some(*hi);
    }
    match lo {
        Some(lo) => format!("[{lo},+inf)"),
        None => "(-inf,+inf)".to_string(),
    }
}

#[derive(Clone)]
struct HeapItem {
    sort_key: Vec<u64>,
    global_doc_id: u64,
    leaf_ord: u32,
    leaf_doc_id: u32,
    score: f32,
}

/// Max-heap wrapper so the natural `BinaryHeap` (a max-heap) surfaces the
/// *worst* admitted candidate at the top, which is exactly what bounded
/// top-K eviction needs to compare against.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key
            .cmp(&other.sort_key)
            .then_with(|| self.global_doc_id.cmp(&other.global_doc_id))
    }
}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key == other.sort_key && self.global_doc_id == other.global_doc_id
    }
}
impl Eq for HeapItem {}

/// Bounded top-K heap ordered by ascending sort key (lower sort key wins
/// the comparison — smaller tuples are "better" since direction is already
/// folded into the encoding), with `globalDocId` ascending as the final
/// tie-break (§4.3, §4.3.1).
struct TopKHeap {
    heap: BinaryHeap<HeapItem>,
    capacity: usize,
}

impl TopKHeap {
    fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
        }
    }

    fn offer(&mut self, item: HeapItem) {
        if self.heap.len() < self.capacity {
            self.heap.push(item);
            return;
        }
        if let Some(worst) = self.heap.peek() {
            if item.cmp(worst) == Ordering::Less {
                self.heap.pop();
                self.heap.push(item);
            }
        }
    }

    /// The current worst admitted sort key, used to skip scoring later
    /// phases for candidates that can't possibly be admitted (§4.3.1).
    fn worst(&self) -> Option<&Vec<u64>> {
        if self.heap.len() < self.capacity {
            None
        } else {
            self.heap.peek().map(|item| &item.sort_key)
        }
    }

    fn into_sorted_vec(self) -> Vec<HeapItem> {
        let mut items: Vec<HeapItem> = self.heap.into_vec();
        items.sort_by(|a, b| a.cmp(b));
        items
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

pub struct CollectionResult {
    pub documents: Vec<Document>,
    pub total_hits: u64,
    pub facets: HashMap<String, HashMap<String, u64>>,
    pub facets_approximate: bool,
}

/// Runs the collector for one shard, over every leaf of `index`.
///
/// `context_features` supplies declared context-feature values, uniform
/// across the whole shard (the broker resolves these once per request).
pub fn collect(
    query: &SearchQuery,
    compiled_filter: &Filter,
    index: &dyn IndexReader,
    requires_scoring: bool,
    context_features: &HashMap<String, f64>,
    foreign_key_bounds: &[ForeignKeyBound<'_>],
    total_hits_threshold: Option<u64>,
) -> Result<CollectionResult, CollectError> {
    let capacity = (query.limit + query.offset).max(1) as usize;
    let mut heap = TopKHeap::new(capacity);
    let mut total_hits: u64 = 0;
    let mut facet_accumulators: Vec<FacetAccumulator> = query
        .facet
        .iter()
        .map(|spec| FacetAccumulator::new(spec.field.clone(), spec.kind, spec.buckets.clone()))
        .collect();
    let mut facets_approximate = false;
    let threshold = total_hits_threshold.unwrap_or(u64::MAX);

    for (leaf_ord, segment) in index.leaves().iter().enumerate() {
        let leaf_ord = leaf_ord as u32;
        let base = index.base_of(leaf_ord);
        let matches = matching_doc_ids(compiled_filter, segment.as_ref())?;
        for leaf_doc_id in matches {
            total_hits += 1;

            let score = if requires_scoring {
                score_document(compiled_filter, segment.as_ref(), leaf_doc_id)
            } else {
                0.0
            };
            let sort_tuple =
                compute_sort_tuple(&query.phased_sort_by, segment.as_ref(), leaf_doc_id, score, context_features);

            if segment.primary_key(leaf_doc_id).is_some() {
                let global_doc_id = base + leaf_doc_id as u64;
                heap.offer(HeapItem {
                    sort_key: sort_tuple,
                    global_doc_id,
                    leaf_ord,
                    leaf_doc_id,
                    score,
                });
            }

            if total_hits <= threshold {
                for facet in facet_accumulators.iter_mut() {
                    facet.accumulate(segment.as_ref(), leaf_doc_id);
                }
            } else {
                facets_approximate = true;
            }
        }
    }

    let mut documents = Vec::new();
    for item in heap.into_sorted_vec() {
        let segment = &index.leaves()[item.leaf_ord as usize];
        let Some(primary_key) = segment.primary_key(item.leaf_doc_id) else {
            continue;
        };
        let mut children = HashMap::new();
        for bound in foreign_key_bounds {
            if let Ok(sorted_set) = segment.sorted_set_doc_values(&bound.foreign_key_field) {
                let mut bound_children = Vec::new();
                for ord in sorted_set.ordinals(item.leaf_doc_id) {
                    if let Some(value) = sorted_set.value_for_ordinal(ord) {
                        if let Some(child) = bound.child_by_primary_key.get(value) {
                            bound_children.push(child.clone());
                        }
                    }
                }
                if !bound_children.is_empty() {
                    children.insert(bound.foreign_key_field.clone(), bound_children);
                }
            }
        }
        documents.push(Document {
            leaf_ord: item.leaf_ord,
            leaf_doc_id: item.leaf_doc_id,
            global_doc_id: item.global_doc_id,
            primary_key: primary_key.to_string(),
            score: item.score,
            sort_key: item.sort_key,
            children,
            group_members: Vec::new(),
        });
    }

    let documents = match &query.group_by {
        Some(group_by) => collapse_groups(documents, index, group_by),
        None => documents,
    };

    let facets = facet_accumulators
        .into_iter()
        .map(|acc| (acc.field.clone(), acc.clone_counts()))
        .collect();

    Ok(CollectionResult {
        documents,
        total_hits,
        facets,
        facets_approximate,
    })
}

/// Reduces a value to the string key `groupBy` collapses on; geo points,
/// vectors and lists have no sensible group identity so they opt a
/// document out of collapsing entirely (§4.3.3).
fn group_key_string(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::String(s) => Some(s.clone()),
        FieldValue::Int64(v) => Some(v.to_string()),
        FieldValue::Double(v) => Some(v.to_string()),
        FieldValue::Boolean(v) => Some(v.to_string()),
        FieldValue::GeoPoint { .. } | FieldValue::Vector(_) | FieldValue::List(_) => None,
    }
}

/// Collapses rank-ordered `documents` that share this shard's `groupBy`
/// field value into one representative per group, keeping the
/// highest-ranked document of each group in place and folding the rest
/// into its `group_members` (§4.3.3). A document whose group-by field is
/// absent, or isn't a scalar `groupKeyString` can represent, keeps its own
/// singleton group rather than being merged with other such documents.
/// This runs shard-local, before hydration: grouping across shards is the
/// broker's responsibility once results are merged.
fn collapse_groups(documents: Vec<Document>, index: &dyn IndexReader, group_by: &GroupBy) -> Vec<Document> {
    let mut collapsed: Vec<Document> = Vec::with_capacity(documents.len());
    let mut representative_of: HashMap<String, usize> = HashMap::new();

    for doc in documents {
        let key = index
            .leaves()
            .get(doc.leaf_ord as usize)
            .and_then(|segment| field_value(segment.as_ref(), doc.leaf_doc_id, &group_by.field))
            .and_then(|value| group_key_string(&value));

        let Some(key) = key else {
            collapsed.push(doc);
            continue;
        };

        if let Some(&idx) = representative_of.get(&key) {
            let representative = &mut collapsed[idx];
            let group_size = representative.group_members.len() as u32 + 1;
            let room = group_by.limit.map(|limit| group_size < limit).unwrap_or(true);
            if room {
                representative.group_members.push(doc);
            }
        } else {
            representative_of.insert(key, collapsed.len());
            collapsed.push(doc);
        }
    }

    collapsed
}

impl FacetAccumulator {
    fn clone_counts(&self) -> HashMap<String, u64> {
        self.counts.clone()
    }
}

/// Evaluates `filter` against one segment, returning the sorted stream of
/// matching local doc ids. `Boolean` combination follows the Occur
/// semantics from §GLOSSARY: `Must`/`Filter` intersect, `MustNot` excludes,
/// `Should` contributes under `minShouldMatch`.
fn matching_doc_ids(filter: &Filter, segment: &dyn SegmentReader) -> Result<Vec<u32>, ReaderError> {
    use std::collections::BTreeSet;

    let set = matching_doc_id_set(filter, segment)?;
    Ok(set.into_iter().collect::<BTreeSet<u32>>().into_iter().collect())
}

fn matching_doc_id_set(filter: &Filter, segment: &dyn SegmentReader) -> Result<std::collections::BTreeSet<u32>, ReaderError> {
    use std::collections::BTreeSet;

    match filter {
        Filter::Term { field, value } => Ok(segment.postings(field, value)?.collect()),
        Filter::TermInSet { field, values } => {
            let mut set = BTreeSet::new();
            for value in values {
                set.extend(segment.postings(field, value)?);
            }
            Ok(set)
        }
        Filter::PointRange { field, lo, hi } => {
            let lo = lo.clone().map(Bound::Included).unwrap_or(Bound::Unbounded);
            let hi = hi.clone().map(Bound::Included).unwrap_or(Bound::Unbounded);
            Ok(segment.range_stream(field, lo, hi)?.collect())
        }
        Filter::GeoDistance {
            field,
            lat,
            lon,
            meters,
        } => Ok(segment.geo_stream(field, (*lat, *lon), *meters)?.collect()),
        Filter::Vector {
            field,
            target,
            k,
            filter: inner,
        } => {
            let prefilter = inner
                .as_ref()
                .map(|f| matching_doc_id_set(f, segment))
                .transpose()?
                .map(|set| set.into_iter().collect::<Vec<_>>());
            let results = segment.vector_top_k(field, target, *k as usize, prefilter.as_deref())?;
            Ok(results.into_iter().map(|(doc_id, _)| doc_id).collect())
        }
        Filter::ReferenceFieldInSet { .. } => {
            // Materialized into `TermInSet` by the compiler (§4.2); a bare
            // `ReferenceFieldInSet` reaching here matches nothing.
            Ok(BTreeSet::new())
        }
        Filter::Boolean {
            clauses,
            min_should_match,
        } => evaluate_boolean(clauses, *min_should_match, segment),
    }
}

fn evaluate_boolean(
    clauses: &[(Occur, Filter)],
    min_should_match: u32,
    segment: &dyn SegmentReader,
) -> Result<std::collections::BTreeSet<u32>, ReaderError> {
    use std::collections::BTreeSet;

    // A `Boolean` with no clauses at all is how the compiler lowers a
    // filterless query (§4.2): match every live document in the segment,
    // not zero. This is distinct from, say, a `MustNot`-only combination
    // with no `Must`/`Should` clauses, which legitimately matches nothing
    // once its exclusions are applied.
    if clauses.is_empty() {
        return Ok((0..segment.num_docs()).collect());
    }

    let mut must_sets: Vec<BTreeSet<u32>> = Vec::new();
    let mut must_not_sets: Vec<BTreeSet<u32>> = Vec::new();
    let mut should_sets: Vec<BTreeSet<u32>> = Vec::new();

    for (occur, child) in clauses {
        let set = matching_doc_id_set(child, segment)?;
        match occur {
            Occur::Must | Occur::Filter => must_sets.push(set),
            Occur::MustNot => must_not_sets.push(set),
            Occur::Should => should_sets.push(set),
        }
    }

    let mut candidates: Option<BTreeSet<u32>> = None;
    for set in &must_sets {
        candidates = Some(match candidates {
            None => set.clone(),
            Some(existing) => existing.intersection(set).copied().collect(),
        });
    }

    let mut doc_should_counts: HashMap<u32, u32> = HashMap::new();
    if !should_sets.is_empty() {
        for set in &should_sets {
            for doc in set {
                *doc_should_counts.entry(*doc).or_insert(0) += 1;
            }
        }
    }

    let mut result: BTreeSet<u32> = match candidates {
        Some(set) => set,
        None if !should_sets.is_empty() => doc_should_counts.keys().copied().collect(),
        None => BTreeSet::new(),
    };

    if !should_sets.is_empty() && min_should_match > 0 {
        result.retain(|doc| doc_should_counts.get(doc).copied().unwrap_or(0) >= min_should_match);
    } else if !should_sets.is_empty() && must_sets.is_empty() {
        // No explicit minimum and nothing mandatory: any Should match counts.
    }

    for excluded in &must_not_sets {
        for doc in excluded {
            result.remove(doc);
        }
    }

    Ok(result)
}

/// Sums clause contributions weighted by occur (`Must`/`Should` score,
/// `Filter`/`MustNot` don't), using the reader's `term_score` hook for
/// term-shaped leaves (§4.3, §6.3's BM25-as-a-black-box Non-goal).
fn score_document(filter: &Filter, segment: &dyn SegmentReader, leaf_doc_id: u32) -> f32 {
    match filter {
        Filter::Term { field, value } => segment.term_score(field, value, leaf_doc_id),
        Filter::TermInSet { field, values } => values
            .iter()
            .map(|v| segment.term_score(field, v, leaf_doc_id))
            .sum(),
        Filter::Vector { field, target, .. } => segment
            .vector_top_k(field, target, 1, Some(&[leaf_doc_id]))
            .ok()
            .and_then(|results| results.into_iter().find(|(doc, _)| *doc == leaf_doc_id))
            .map(|(_, score)| score)
            .unwrap_or(0.0),
        Filter::PointRange { .. } | Filter::GeoDistance { .. } | Filter::ReferenceFieldInSet { .. } => 0.0,
        Filter::Boolean { clauses, .. } => clauses
            .iter()
            .map(|(occur, child)| {
                if occur.contributes_to_score() {
                    score_document(child, segment, leaf_doc_id)
                } else {
                    0.0
                }
            })
            .sum(),
    }
}

/// Resolves a set of primary keys directly against one shard's index for a
/// single namespace, producing identity-only `Document`s suitable for a
/// `ForeignKeyBound` (§4.3.2, §4.5). Children only ever attach when they
/// live in the same shard as the parent: a key with no match here is simply
/// absent from the returned map, which is how cross-shard references are
/// silently dropped rather than erroring (§3 Foreign key).
pub fn resolve_primary_keys(
    index: &dyn IndexReader,
    primary_key_field: &str,
    keys: &std::collections::HashSet<String>,
) -> Result<HashMap<String, Document>, ReaderError> {
    let mut found = HashMap::new();
    for (leaf_ord, segment) in index.leaves().iter().enumerate() {
        let leaf_ord = leaf_ord as u32;
        let base = index.base_of(leaf_ord);
        for key in keys {
            if found.contains_key(key) {
                continue;
            }
            let mut matches = segment.postings(primary_key_field, &FieldValue::String(key.clone()))?;
            if let Some(leaf_doc_id) = matches.next() {
                found.insert(
                    key.clone(),
                    Document {
                        leaf_ord,
                        leaf_doc_id,
                        global_doc_id: base + leaf_doc_id as u64,
                        primary_key: key.clone(),
                        score: 0.0,
                        sort_key: Vec::new(),
                        children: HashMap::new(),
                        group_members: Vec::new(),
                    },
                );
            }
        }
    }
    Ok(found)
}

/// Convenience used by the hydrator and join executor to read a field's
/// value off a document they already know matched, without re-running the
/// query: resolves via stored fields first, falling back to doc values.
pub fn field_value(
    segment: &dyn SegmentReader,
    leaf_doc_id: u32,
    field: &str,
) -> Option<FieldValue> {
    let mut requested = std::collections::HashSet::new();
    requested.insert(field.to_string());
    segment
        .stored_fields()
        .document(leaf_doc_id, &requested)
        .ok()
        .and_then(|mut map| map.remove(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_nan_sort_last_ascending_and_descending() {
        let asc_missing = encode_component(None, SortDirection::Asc);
        let asc_present = encode_component(Some(1.0), SortDirection::Asc);
        assert!(asc_missing > asc_present);

        let desc_missing = encode_component(None, SortDirection::Desc);
        let desc_present = encode_component(Some(1.0), SortDirection::Desc);
        assert!(desc_missing > desc_present);

        let nan = encode_component(Some(f64::NAN), SortDirection::Asc);
        assert_eq!(nan, MISSING_SENTINEL);
    }

    #[test]
    fn ascending_direction_preserves_order() {
        let low = encode_component(Some(1.0), SortDirection::Asc);
        let high = encode_component(Some(2.0), SortDirection::Asc);
        assert!(low < high, "ascending sort wants smaller values to win the tuple comparison");
    }

    #[test]
    fn descending_direction_inverts_order() {
        let low = encode_component(Some(1.0), SortDirection::Desc);
        let high = encode_component(Some(2.0), SortDirection::Desc);
        assert!(high < low, "descending sort wants larger values to win the tuple comparison");
    }

    #[test]
    fn topk_heap_evicts_worst_first() {
        let mut heap = TopKHeap::new(2);
        heap.offer(HeapItem {
            sort_key: vec![10],
            global_doc_id: 1,
            leaf_ord: 0,
            leaf_doc_id: 1,
            score: 0.0,
        });
        heap.offer(HeapItem {
            sort_key: vec![5],
            global_doc_id: 2,
            leaf_ord: 0,
            leaf_doc_id: 2,
            score: 0.0,
        });
        heap.offer(HeapItem {
            sort_key: vec![1],
            global_doc_id: 3,
            leaf_ord: 0,
            leaf_doc_id: 3,
            score: 0.0,
        });
        let sorted = heap.into_sorted_vec();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].sort_key, vec![1]);
        assert_eq!(sorted[1].sort_key, vec![5]);
    }

    fn doc_with_category(leaf_doc_id: u32, global_doc_id: u64, primary_key: &str) -> Document {
        Document {
            leaf_ord: 0,
            leaf_doc_id,
            global_doc_id,
            primary_key: primary_key.to_string(),
            score: 0.0,
            sort_key: vec![global_doc_id],
            children: HashMap::new(),
            group_members: Vec::new(),
        }
    }

    fn category_index(categories: &[&str]) -> lattice_schema::testing::InMemoryIndexReader {
        use lattice_schema::testing::{FakeDoc, InMemoryIndexReader, InMemorySegment};

        let docs = categories
            .iter()
            .enumerate()
            .map(|(i, category)| {
                let mut fields = HashMap::new();
                fields.insert("category".to_string(), FieldValue::String(category.to_string()));
                FakeDoc::new(format!("p{i}"), fields)
            })
            .collect();
        InMemoryIndexReader::new(vec![InMemorySegment::new(docs)])
    }

    #[test]
    fn collapse_groups_merges_same_key_into_representative() {
        let index = category_index(&["red", "red", "blue"]);
        let documents = vec![
            doc_with_category(0, 0, "p0"),
            doc_with_category(1, 1, "p1"),
            doc_with_category(2, 2, "p2"),
        ];
        let group_by = GroupBy {
            field: "category".to_string(),
            limit: None,
        };

        let collapsed = collapse_groups(documents, &index, &group_by);

        assert_eq!(collapsed.len(), 2, "red's two docs collapse to one representative");
        assert_eq!(collapsed[0].primary_key, "p0");
        assert_eq!(collapsed[0].group_members.len(), 1);
        assert_eq!(collapsed[0].group_members[0].primary_key, "p1");
        assert_eq!(collapsed[1].primary_key, "p2");
        assert!(collapsed[1].group_members.is_empty());
    }

    #[test]
    fn collapse_groups_respects_limit() {
        let index = category_index(&["red", "red", "red"]);
        let documents = vec![
            doc_with_category(0, 0, "p0"),
            doc_with_category(1, 1, "p1"),
            doc_with_category(2, 2, "p2"),
        ];
        let group_by = GroupBy {
            field: "category".to_string(),
            limit: Some(2),
        };

        let collapsed = collapse_groups(documents, &index, &group_by);

        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].group_members.len(), 1, "limit of 2 admits only one extra member");
        assert_eq!(collapsed[0].group_members[0].primary_key, "p1");
    }
}

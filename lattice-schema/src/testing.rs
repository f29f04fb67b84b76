//! An in-memory stand-in for the external segmented-index library (§6.3).
//! Exists only to let `lattice-search`'s tests build the scenarios in §8 of
//! the design notes without a real index: every method below does a plain
//! linear scan, which is fine for the handful of documents a unit or
//! scenario test constructs and would be a poor choice for anything else.

use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use crate::reader::{
    BinaryDocValues, DocIdStream, IndexReader, NumericDocValues, ReaderError, SegmentReader,
    SortedSetDocValues, StoredFieldsReader,
};
use crate::value::FieldValue;

#[derive(Debug, Clone)]
pub struct FakeDoc {
    pub primary_key: String,
    pub fields: HashMap<String, FieldValue>,
}

impl FakeDoc {
    pub fn new(primary_key: impl Into<String>, fields: HashMap<String, FieldValue>) -> Self {
        Self {
            primary_key: primary_key.into(),
            fields,
        }
    }
}

fn field_value_strings(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::String(s) => vec![s.clone()],
        FieldValue::List(items) => items.iter().filter_map(|v| v.as_str()).map(String::from).collect(),
        _ => Vec::new(),
    }
}

fn term_matches(value: &FieldValue, term: &FieldValue) -> bool {
    match value {
        FieldValue::List(items) => items.iter().any(|item| item == term),
        other => other == term,
    }
}

/// One segment's worth of fake documents. The primary-key-uniqueness
/// invariant (§3) is asserted at construction time so fixtures can't
/// accidentally violate what the rest of the system assumes.
pub struct InMemorySegment {
    docs: Vec<FakeDoc>,
}

impl InMemorySegment {
    pub fn new(docs: Vec<FakeDoc>) -> Self {
        let mut seen = HashSet::new();
        for doc in &docs {
            assert!(
                seen.insert(doc.primary_key.clone()),
                "duplicate primary key {} within one segment violates the per-shard uniqueness invariant",
                doc.primary_key
            );
        }
        Self { docs }
    }
}

struct InMemorySortedSet {
    dictionary: Vec<String>,
    per_doc: Vec<Vec<u32>>,
}

impl SortedSetDocValues for InMemorySortedSet {
    fn ordinals(&self, doc_id: u32) -> Vec<u32> {
        self.per_doc.get(doc_id as usize).cloned().unwrap_or_default()
    }

    fn value_for_ordinal(&self, ord: u32) -> Option<&str> {
        self.dictionary.get(ord as usize).map(|s| s.as_str())
    }
}

struct InMemoryNumeric {
    values: Vec<Option<f64>>,
}

impl NumericDocValues for InMemoryNumeric {
    fn get(&self, doc_id: u32) -> Option<f64> {
        self.values.get(doc_id as usize).copied().flatten()
    }
}

struct InMemoryBinary {
    values: Vec<Option<Vec<u8>>>,
}

impl BinaryDocValues for InMemoryBinary {
    fn get(&self, doc_id: u32) -> Option<&[u8]> {
        self.values.get(doc_id as usize).and_then(|v| v.as_deref())
    }
}

impl StoredFieldsReader for InMemorySegment {
    fn document(
        &self,
        leaf_doc_id: u32,
        fields: &HashSet<String>,
    ) -> Result<HashMap<String, FieldValue>, ReaderError> {
        let doc = self
            .docs
            .get(leaf_doc_id as usize)
            .ok_or_else(|| ReaderError::Io(format!("doc id {leaf_doc_id} out of range")))?;
        Ok(doc
            .fields
            .iter()
            .filter(|(k, _)| fields.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl SegmentReader for InMemorySegment {
    fn num_docs(&self) -> u32 {
        self.docs.len() as u32
    }

    fn postings(&self, field: &str, term: &FieldValue) -> Result<DocIdStream<'_>, ReaderError> {
        let matches: Vec<u32> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| {
                if field == "_primary_key" {
                    return doc.primary_key == term.as_str().unwrap_or_default();
                }
                doc.fields
                    .get(field)
                    .map(|v| term_matches(v, term))
                    .unwrap_or(false)
            })
            .map(|(i, _)| i as u32)
            .collect();
        Ok(Box::new(matches.into_iter()))
    }

    fn terms_enum(&self, field: &str) -> Result<Box<dyn Iterator<Item = String> + '_>, ReaderError> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for doc in &self.docs {
            if let Some(value) = doc.fields.get(field) {
                for s in field_value_strings(value) {
                    if seen.insert(s.clone()) {
                        terms.push(s);
                    }
                }
            }
        }
        Ok(Box::new(terms.into_iter()))
    }

    fn range_stream(
        &self,
        field: &str,
        lo: Bound<FieldValue>,
        hi: Bound<FieldValue>,
    ) -> Result<DocIdStream<'_>, ReaderError> {
        let satisfies = |value: f64| -> bool {
            let lo_ok = match &lo {
                Bound::Included(v) => value >= v.as_f64().unwrap_or(f64::NEG_INFINITY),
                Bound::Excluded(v) => value > v.as_f64().unwrap_or(f64::NEG_INFINITY),
                Bound::Unbounded => true,
            };
            let hi_ok = match &hi {
                Bound::Included(v) => value <= v.as_f64().unwrap_or(f64::INFINITY),
                Bound::Excluded(v) => value < v.as_f64().unwrap_or(f64::INFINITY),
                Bound::Unbounded => true,
            };
            lo_ok && hi_ok
        };
        let matches: Vec<u32> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| {
                doc.fields
                    .get(field)
                    .and_then(|v| v.as_f64())
                    .map(satisfies)
                    .unwrap_or(false)
            })
            .map(|(i, _)| i as u32)
            .collect();
        Ok(Box::new(matches.into_iter()))
    }

    fn geo_stream(
        &self,
        field: &str,
        center: (f64, f64),
        radius_meters: f64,
    ) -> Result<DocIdStream<'_>, ReaderError> {
        const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
        let haversine = |a: (f64, f64), b: (f64, f64)| -> f64 {
            let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
            let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
            let d_lat = lat2 - lat1;
            let d_lon = lon2 - lon1;
            let h = (d_lat / 2.0).sin().powi(2)
                + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
            2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
        };
        let matches: Vec<u32> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| {
                doc.fields
                    .get(field)
                    .and_then(|v| v.as_geo_point())
                    .map(|p| haversine(center, p) <= radius_meters)
                    .unwrap_or(false)
            })
            .map(|(i, _)| i as u32)
            .collect();
        Ok(Box::new(matches.into_iter()))
    }

    fn vector_top_k(
        &self,
        field: &str,
        target: &[f32],
        k: usize,
        prefilter: Option<&[u32]>,
    ) -> Result<Vec<(u32, f32)>, ReaderError> {
        let allowed: Option<HashSet<u32>> = prefilter.map(|p| p.iter().copied().collect());
        let mut scored: Vec<(u32, f32)> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(i, _)| allowed.as_ref().map(|a| a.contains(&(*i as u32))).unwrap_or(true))
            .filter_map(|(i, doc)| {
                let v = doc.fields.get(field)?.as_vector()?;
                if v.len() != target.len() {
                    return None;
                }
                let dot: f32 = v.iter().zip(target).map(|(a, b)| a * b).sum();
                let norm_a: f32 = v.iter().map(|a| a * a).sum::<f32>().sqrt();
                let norm_b: f32 = target.iter().map(|b| b * b).sum::<f32>().sqrt();
                let cosine = if norm_a > 0.0 && norm_b > 0.0 {
                    dot / (norm_a * norm_b)
                } else {
                    0.0
                };
                Some((i as u32, cosine))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn sorted_set_doc_values(&self, field: &str) -> Result<Box<dyn SortedSetDocValues + '_>, ReaderError> {
        let mut dictionary: Vec<String> = Vec::new();
        let mut per_doc: Vec<Vec<u32>> = Vec::with_capacity(self.docs.len());
        for doc in &self.docs {
            let mut ords = Vec::new();
            if let Some(value) = doc.fields.get(field) {
                for s in field_value_strings(value) {
                    let ord = match dictionary.iter().position(|d| d == &s) {
                        Some(i) => i as u32,
                        None => {
                            dictionary.push(s);
                            (dictionary.len() - 1) as u32
                        }
                    };
                    ords.push(ord);
                }
            }
            per_doc.push(ords);
        }
        Ok(Box::new(InMemorySortedSet { dictionary, per_doc }))
    }

    fn numeric_doc_values(&self, field: &str) -> Result<Box<dyn NumericDocValues + '_>, ReaderError> {
        let values = self.docs.iter().map(|doc| doc.fields.get(field).and_then(|v| v.as_f64())).collect();
        Ok(Box::new(InMemoryNumeric { values }))
    }

    fn binary_doc_values(&self, field: &str) -> Result<Box<dyn BinaryDocValues + '_>, ReaderError> {
        let values = self
            .docs
            .iter()
            .map(|doc| doc.fields.get(field).and_then(|v| v.as_str()).map(|s| s.as_bytes().to_vec()))
            .collect();
        Ok(Box::new(InMemoryBinary { values }))
    }

    fn stored_fields(&self) -> &dyn StoredFieldsReader {
        self
    }

    fn primary_key(&self, leaf_doc_id: u32) -> Option<&str> {
        self.docs.get(leaf_doc_id as usize).map(|d| d.primary_key.as_str())
    }
}

/// A shard's worth of fake segments, with cumulative global-doc-id bases
/// precomputed the way a real `IndexReader` would.
pub struct InMemoryIndexReader {
    leaves: Vec<Arc<dyn SegmentReader>>,
    bases: Vec<u64>,
}

impl InMemoryIndexReader {
    pub fn new(segments: Vec<InMemorySegment>) -> Self {
        let mut bases = Vec::with_capacity(segments.len());
        let mut running = 0u64;
        for segment in &segments {
            bases.push(running);
            running += segment.num_docs() as u64;
        }
        let leaves = segments
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn SegmentReader>)
            .collect();
        Self { leaves, bases }
    }
}

impl IndexReader for InMemoryIndexReader {
    fn leaves(&self) -> &[Arc<dyn SegmentReader>] {
        &self.leaves
    }

    fn base_of(&self, leaf_ord: u32) -> u64 {
        self.bases[leaf_ord as usize]
    }
}

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

//! The Hydrator (§4.4): turns the collector's in-flight `Document`s into
//! wire `Hit`s by reading `returnFields` off the owning segment's stored
//! fields, in the order the caller declared them. A document whose stored
//! fields fail to read is dropped from the page rather than failing the
//! whole request (§4.4 edge case); `HydratedPage::dropped` tells the caller
//! how many, so it can bump an error counter.

use std::collections::{HashMap, HashSet};

use lattice_schema::{FieldValue, IndexReader};

use crate::collector::Document;
use crate::wire::{GlobalDocId, Hit, SortKeyValue};

/// One namespace's declared return fields, keyed by the foreign-key field
/// name under which its documents were attached (matches
/// `Document::children`'s keys), so hydrating a child doesn't require
/// threading its namespace name through separately.
pub type ChildReturnFields = HashMap<String, Vec<String>>;

/// A page of hydrated hits plus the flat pool their `child_document_offsets`
/// index into (§6.1 FLAT_NORMALIZED).
pub struct HydratedPage {
    pub hits: Vec<Hit>,
    pub children: Vec<Hit>,
    /// Number of top-level documents dropped because their stored fields
    /// failed to read.
    pub dropped: u64,
}

/// Hydrates one shard's page of collected documents (§4.4). `shard_id` is
/// stitched into every `Hit`/`GlobalDocId` so the broker's merge can
/// tie-break across shards without the hydrator knowing about other shards.
pub fn hydrate(
    shard_id: u32,
    documents: Vec<Document>,
    index: &dyn IndexReader,
    return_fields: &[String],
    child_return_fields: &ChildReturnFields,
) -> HydratedPage {
    let mut children = Vec::new();
    let mut hits = Vec::with_capacity(documents.len());
    let mut dropped = 0u64;

    for doc in documents {
        let fields = match hydrate_fields(index, doc.leaf_ord, doc.leaf_doc_id, return_fields) {
            Ok(fields) => fields,
            Err(()) => {
                dropped += 1;
                continue;
            }
        };

        let mut child_document_offsets = HashMap::new();
        for (fk_field, child_docs) in &doc.children {
            let fields_for_child = child_return_fields.get(fk_field).map(Vec::as_slice).unwrap_or(&[]);
            let mut offsets = Vec::with_capacity(child_docs.len());
            for child in child_docs {
                let child_fields = match hydrate_fields(index, child.leaf_ord, child.leaf_doc_id, fields_for_child) {
                    Ok(fields) => fields,
                    Err(()) => continue,
                };
                offsets.push(children.len());
                children.push(Hit {
                    primary_key: child.primary_key.clone(),
                    global_doc_id: child.global_doc_id,
                    shard_id,
                    score: child.score,
                    sort_key: SortKeyValue {
                        components: child.sort_key.clone(),
                        doc_id: GlobalDocId {
                            shard_id,
                            global_doc_id: child.global_doc_id,
                        },
                    },
                    fields: child_fields,
                    child_document_offsets: HashMap::new(),
                    group_members: Vec::new(),
                });
            }
            if !offsets.is_empty() {
                child_document_offsets.insert(fk_field.clone(), offsets);
            }
        }

        let mut group_members = Vec::with_capacity(doc.group_members.len());
        for member in &doc.group_members {
            let member_fields = match hydrate_fields(index, member.leaf_ord, member.leaf_doc_id, return_fields) {
                Ok(fields) => fields,
                Err(()) => continue,
            };
            group_members.push(Hit {
                primary_key: member.primary_key.clone(),
                global_doc_id: member.global_doc_id,
                shard_id,
                score: member.score,
                sort_key: SortKeyValue {
                    components: member.sort_key.clone(),
                    doc_id: GlobalDocId {
                        shard_id,
                        global_doc_id: member.global_doc_id,
                    },
                },
                fields: member_fields,
                child_document_offsets: HashMap::new(),
                group_members: Vec::new(),
            });
        }

        hits.push(Hit {
            primary_key: doc.primary_key,
            global_doc_id: doc.global_doc_id,
            shard_id,
            score: doc.score,
            sort_key: SortKeyValue {
                components: doc.sort_key,
                doc_id: GlobalDocId {
                    shard_id,
                    global_doc_id: doc.global_doc_id,
                },
            },
            fields,
            child_document_offsets,
            group_members,
        });
    }

    HydratedPage { hits, children, dropped }
}

/// Reads `return_fields` off one document's stored-fields store. An empty
/// `return_fields` is a request for no payload, not an error, so it returns
/// `Ok` without touching the segment at all.
fn hydrate_fields(
    index: &dyn IndexReader,
    leaf_ord: u32,
    leaf_doc_id: u32,
    return_fields: &[String],
) -> Result<HashMap<String, FieldValue>, ()> {
    if return_fields.is_empty() {
        return Ok(HashMap::new());
    }
    let segment = index.leaves().get(leaf_ord as usize).ok_or(())?;
    let requested: HashSet<String> = return_fields.iter().cloned().collect();
    segment.stored_fields().document(leaf_doc_id, &requested).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use lattice_schema::testing::{FakeDoc, InMemoryIndexReader, InMemorySegment};
    use lattice_schema::FieldValue;

    use super::*;

    fn fixture() -> InMemoryIndexReader {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), FieldValue::String("widget".to_string()));
        InMemoryIndexReader::new(vec![InMemorySegment::new(vec![FakeDoc::new("p1", fields)])])
    }

    #[test]
    fn hydrates_requested_fields_only() {
        let index = fixture();
        let doc = Document {
            leaf_ord: 0,
            leaf_doc_id: 0,
            global_doc_id: 0,
            primary_key: "p1".to_string(),
            score: 1.0,
            sort_key: vec![0],
            children: HashMap::new(),
            group_members: Vec::new(),
        };
        let page = hydrate(0, vec![doc], &index, &["title".to_string()], &HashMap::new());
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.dropped, 0);
        assert_eq!(page.hits[0].fields.get("title"), Some(&FieldValue::String("widget".to_string())));
        assert!(page.hits[0].fields.get("unused").is_none());
    }

    #[test]
    fn drops_documents_whose_segment_is_out_of_range() {
        let index = fixture();
        let doc = Document {
            leaf_ord: 7,
            leaf_doc_id: 0,
            global_doc_id: 0,
            primary_key: "ghost".to_string(),
            score: 0.0,
            sort_key: vec![],
            children: HashMap::new(),
            group_members: Vec::new(),
        };
        let page = hydrate(0, vec![doc], &index, &["title".to_string()], &HashMap::new());
        assert_eq!(page.hits.len(), 0);
        assert_eq!(page.dropped, 1);
    }
}

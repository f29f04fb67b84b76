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

//! Static description of namespaces, field types, primary/foreign keys and
//! sharding, plus the narrow read-only port the query core depends on for
//! access to a segmented index (§6.3 of the design notes this crate
//! implements). The segment storage engine itself lives outside this
//! workspace; everything here is either data or a trait.

pub mod namespace;
pub mod reader;
pub mod value;

#[cfg(any(test, feature = "testsuite"))]
pub mod testing;

pub use namespace::{Container, FieldSchema, ForeignKey, Namespace, ShardingConfig};
pub use reader::{
    BinaryDocValues, DocIdStream, IndexReader, NumericDocValues, ReaderError, SegmentReader,
    SortedSetDocValues, StoredFieldsReader,
};
pub use value::{FieldType, FieldValue};

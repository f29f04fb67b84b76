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

//! Ambient primitives shared by every lattice-search crate: logging setup,
//! metrics registration helpers, the stable micro-shard hash, and the
//! `ServiceError` trait used to classify errors for callers.

pub mod error;
pub mod hash;
pub mod logging;
pub mod metrics;

pub use error::ServiceError;
pub use hash::stable_hash_mod;

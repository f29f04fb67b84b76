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

//! Wire encoding for searcher/broker messages (§6.4). Two formats share one
//! byte layout: a one-byte version prefix followed by either a raw JSON
//! payload (`FLAT_NORMALIZED`) or an LZ4-framed one
//! (`FLAT_NORMALIZED_COMPRESSED`). Each message is self-contained; no
//! dictionary is shared across messages.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SearchError;

/// The only version this build knows how to produce or consume. Bumped
/// whenever the byte layout changes incompatibly.
const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    FlatNormalized,
    FlatNormalizedCompressed,
}

/// `prefix byte: 0 = uncompressed JSON, 1 = LZ4-compressed JSON`, following
/// the `FORMAT_VERSION` byte. Kept as its own byte (rather than folded into
/// the version byte) so new compression schemes can be added without a
/// version bump.
const TAG_UNCOMPRESSED: u8 = 0;
const TAG_LZ4: u8 = 1;

pub fn encode<T: Serialize>(value: &T, format: WireFormat) -> Result<Vec<u8>, SearchError> {
    let json = serde_json::to_vec(value)
        .map_err(|err| SearchError::Internal(format!("failed to encode message: {err}")))?;
    let mut out = Vec::with_capacity(json.len() + 2);
    out.push(FORMAT_VERSION);
    match format {
        WireFormat::FlatNormalized => {
            out.push(TAG_UNCOMPRESSED);
            out.extend_from_slice(&json);
        }
        WireFormat::FlatNormalizedCompressed => {
            out.push(TAG_LZ4);
            out.extend_from_slice(&lz4_flex::compress_prepend_size(&json));
        }
    }
    Ok(out)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SearchError> {
    let (&version, rest) = bytes
        .split_first()
        .ok_or_else(|| SearchError::Internal("empty wire message".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(SearchError::Internal(format!(
            "unsupported wire format version {version}"
        )));
    }
    let (&tag, payload) = rest
        .split_first()
        .ok_or_else(|| SearchError::Internal("truncated wire message".to_string()))?;
    let json = match tag {
        TAG_UNCOMPRESSED => payload.to_vec(),
        TAG_LZ4 => lz4_flex::decompress_size_prepended(payload)
            .map_err(|err| SearchError::Internal(format!("failed to decompress message: {err}")))?,
        other => return Err(SearchError::Internal(format!("unknown wire tag {other}"))),
    };
    serde_json::from_slice(&json)
        .map_err(|err| SearchError::Internal(format!("failed to decode message: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_uncompressed() {
        let value = vec!["a".to_string(), "b".to_string()];
        let bytes = encode(&value, WireFormat::FlatNormalized).unwrap();
        let back: Vec<String> = decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn round_trips_compressed() {
        let value = vec![1u32, 2, 3, 4, 5];
        let bytes = encode(&value, WireFormat::FlatNormalizedCompressed).unwrap();
        let back: Vec<u32> = decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = encode(&42u32, WireFormat::FlatNormalized).unwrap();
        bytes[0] = 99;
        let result: Result<u32, SearchError> = decode(&bytes);
        assert!(result.is_err());
    }
}

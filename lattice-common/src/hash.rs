use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// Fixed key pair so the hash is stable across process restarts and across
/// the ingestion pipeline and the query core computing it independently.
/// Must never change for a live index generation (§3 Sharding).
const HASH_KEY_0: u64 = 0x6c61_7474_6963_6573; // "lattices" in hex-ish, arbitrary but fixed
const HASH_KEY_1: u64 = 0x7368_6172_645f_6b30; // "shard_k0"

/// Deterministic `microShardId` derivation: `stable_hash(key) mod m`.
///
/// Used both by the Shard Selector (§4.7) and, conceptually, by the
/// (external, out-of-scope) ingestion pipeline that must agree on the same
/// mapping for a document to land in the same micro-shard it will later be
/// queried from.
pub fn stable_hash_mod(key: &str, m: u32) -> u32 {
    assert!(m > 0, "number of micro-shards must be positive");
    let mut hasher = SipHasher13::new_with_keys(HASH_KEY_0, HASH_KEY_1);
    hasher.write(key.as_bytes());
    (hasher.finish() % m as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic_across_calls() {
        assert_eq!(stable_hash_mod("store-42", 16), stable_hash_mod("store-42", 16));
    }

    #[test]
    fn stays_within_bounds() {
        for key in ["a", "b", "some-longer-primary-key", ""] {
            let m = stable_hash_mod(key, 7);
            assert!(m < 7);
        }
    }

    #[test]
    fn different_keys_usually_differ() {
        let a = stable_hash_mod("alpha", 1_000_000);
        let b = stable_hash_mod("beta", 1_000_000);
        assert_ne!(a, b);
    }
}

use serde::{Deserialize, Serialize};

use crate::value::FieldType;

/// Whether a foreign-key field holds a single reference or a list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    Scalar,
    List,
}

/// `(name, container, children, required?)` (§3 Foreign key).
///
/// At indexing time a foreign-key value produces three physical
/// representations that the query core relies on: a retrievable term for
/// exact matching, a sorted-set column for ordinal iteration, and a
/// reverse-lookup term in a reserved namespace. Those representations are
/// the external ingestion pipeline's responsibility; this struct only
/// records the declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub container: Container,
    pub children: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

impl ForeignKey {
    pub fn references(&self, namespace: &str) -> bool {
        self.children.iter().any(|c| c == namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    /// Whether this field is backed by a doc-value column (cheap,
    /// columnar hydration) as opposed to the row-oriented stored-field
    /// store (§4.4 Hydrator). Defaults to `false` (stored-field-only),
    /// the safer assumption for fields the schema doesn't say otherwise.
    #[serde(default)]
    pub doc_value: bool,
}

/// A logical document class (§3 Namespace). Every document belongs to
/// exactly one namespace; each namespace is stored in its own segmented
/// index within a shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub primary_key_field: String,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    pub fields: Vec<FieldSchema>,
}

impl Namespace {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        name == self.primary_key_field || self.field(name).is_some()
    }

    /// The foreign key in this namespace whose `children` includes
    /// `child_namespace`, chosen deterministically (first declared) when
    /// several qualify. `None` means no such foreign key exists; more than
    /// one qualifying candidate is not itself an error here — ambiguity is
    /// the compiler's concern (§4.2) since only it knows whether the
    /// caller tolerates choosing the first match.
    pub fn foreign_key_to(&self, child_namespace: &str) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.references(child_namespace))
    }

    /// All foreign keys in this namespace referencing `child_namespace`,
    /// used by the planner to detect and reject genuine ambiguity.
    pub fn foreign_keys_to(&self, child_namespace: &str) -> Vec<&ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.references(child_namespace))
            .collect()
    }
}

/// Fixes `numberOfShards S` and `numberOfMicroShards M` with `M mod S = 0`
/// (§3 Sharding). The mapping from micro-shard to shard is immutable for
/// the lifetime of an index generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingConfig {
    pub number_of_shards: u32,
    pub number_of_micro_shards: u32,
}

impl ShardingConfig {
    pub fn new(number_of_shards: u32, number_of_micro_shards: u32) -> Result<Self, String> {
        if number_of_shards == 0 || number_of_micro_shards == 0 {
            return Err("shard and micro-shard counts must be positive".to_string());
        }
        if number_of_micro_shards % number_of_shards != 0 {
            return Err(format!(
                "numberOfMicroShards ({number_of_micro_shards}) must be a multiple of \
                 numberOfShards ({number_of_shards})"
            ));
        }
        Ok(Self {
            number_of_shards,
            number_of_micro_shards,
        })
    }

    /// Number of micro-shards folded into each shard: `M / S`.
    pub fn micro_shards_per_shard(&self) -> u32 {
        self.number_of_micro_shards / self.number_of_shards
    }

    /// `microShardId(key)` — the deterministic hash used at both ingestion
    /// and query time (§3, §4.7).
    pub fn micro_shard_id(&self, key: &str) -> u32 {
        lattice_common::stable_hash_mod(key, self.number_of_micro_shards)
    }

    /// Shard index for a given micro-shard id: `m / (M/S)`.
    pub fn shard_for_micro_shard(&self, micro_shard_id: u32) -> u32 {
        micro_shard_id / self.micro_shards_per_shard()
    }

    /// Convenience composing `micro_shard_id` and `shard_for_micro_shard`.
    pub fn shard_for_key(&self, key: &str) -> u32 {
        self.shard_for_micro_shard(self.micro_shard_id(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_multiple_micro_shard_count() {
        assert!(ShardingConfig::new(3, 10).is_err());
        assert!(ShardingConfig::new(3, 9).is_ok());
    }

    #[test]
    fn shard_for_micro_shard_divides_evenly() {
        let cfg = ShardingConfig::new(2, 4).unwrap();
        assert_eq!(cfg.micro_shards_per_shard(), 2);
        assert_eq!(cfg.shard_for_micro_shard(0), 0);
        assert_eq!(cfg.shard_for_micro_shard(1), 0);
        assert_eq!(cfg.shard_for_micro_shard(2), 1);
        assert_eq!(cfg.shard_for_micro_shard(3), 1);
    }

    #[test]
    fn shard_for_key_is_stable() {
        let cfg = ShardingConfig::new(4, 16).unwrap();
        assert_eq!(cfg.shard_for_key("doc-1"), cfg.shard_for_key("doc-1"));
    }
}

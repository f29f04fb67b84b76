use lattice_schema::FieldValue;
use serde::{Deserialize, Serialize};

/// How a clause in a boolean combination participates in matching and
/// scoring (§4.1). `MUST`/`SHOULD` contribute to score; `FILTER`/`MUST_NOT`
/// never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    Must,
    MustNot,
    Should,
    Filter,
}

impl Occur {
    pub fn contributes_to_score(self) -> bool {
        matches!(self, Occur::Must | Occur::Should)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One component of a `phasedSortBy` tuple (§4.3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SortKey {
    Field { name: String },
    Score,
    DocId,
    ContextFeature { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasedSortKey {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// The query AST's filter algebra (§4.1): a closed tagged union so the
/// planner can rewrite it with an exhaustive `match` and the compiler can
/// lower it the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Filter {
    Term {
        field: String,
        value: FieldValue,
    },
    TermInSet {
        field: String,
        values: Vec<FieldValue>,
    },
    PointRange {
        field: String,
        lo: Option<FieldValue>,
        hi: Option<FieldValue>,
    },
    GeoDistance {
        field: String,
        lat: f64,
        lon: f64,
        meters: f64,
    },
    Vector {
        field: String,
        target: Vec<f32>,
        k: u32,
        #[serde(default)]
        filter: Option<Box<Filter>>,
    },
    Boolean {
        clauses: Vec<(Occur, Filter)>,
        #[serde(default)]
        min_should_match: u32,
    },
    ReferenceFieldInSet {
        field: String,
        ref_namespace: String,
        ref_field: String,
    },
}

impl Filter {
    /// A filter is "pure" (never contributes to score) when it is a single
    /// non-boolean leaf that is conventionally used under FILTER/MUST_NOT,
    /// or a boolean all of whose clauses are themselves pure and occur
    /// under FILTER/MUST_NOT. Used by the planner's rewrite #4.
    pub fn is_always_non_scoring(&self) -> bool {
        match self {
            Filter::Boolean { clauses, .. } => clauses
                .iter()
                .all(|(occur, filter)| !occur.contributes_to_score() && filter.is_always_non_scoring()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub terms: Vec<String>,
    pub occur: Occur,
    #[serde(default)]
    pub min_should_match: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorQuery {
    pub field: String,
    pub target: Vec<f32>,
    pub k: u32,
    #[serde(default)]
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyQuery {
    pub field: String,
    pub value: String,
    #[serde(default = "default_max_edits")]
    pub max_edits: u32,
}

fn default_max_edits() -> u32 {
    2
}

/// `{groups, vectorQueries, clientKeywords?, fuzzyQueries}` (§4.1).
/// `clientKeywords` is logging/telemetry-only input (§9 Open Question 2,
/// resolved in SPEC_FULL.md) — it is never compiled into the scored query
/// tree, so the compiler never reads it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Keywords {
    #[serde(default)]
    pub groups: Vec<KeywordGroup>,
    #[serde(default)]
    pub vector_queries: Vec<VectorQuery>,
    #[serde(default)]
    pub client_keywords: Option<Vec<String>>,
    #[serde(default)]
    pub fuzzy_queries: Vec<FuzzyQuery>,
}

impl Keywords {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.vector_queries.is_empty() && self.fuzzy_queries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    TermCount,
    Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSpec {
    pub field: String,
    pub kind: FacetKind,
    /// Half-open bucket boundaries, only meaningful for `Histogram`.
    #[serde(default)]
    pub buckets: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub field: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    MaxScore,
    FirstSeen,
    None,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        DedupPolicy::MaxScore
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dedup {
    pub policy: DedupPolicy,
}

/// One rule in the broker's L2 reorder pipeline (§4.8.4). Kept as a small,
/// closed set of declarative rule kinds rather than an arbitrary callback
/// so that it survives the wire and is trivially replayable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Reordering {
    /// Multiplies the running score by `weight` when `context_feature` is
    /// present on the document, leaving the score unchanged otherwise.
    BoostByContextFeature { context_feature: String, weight: f64 },
    /// Clamps the running score into `[min, max]`.
    ClampScore { min: f64, max: f64 },
}

/// `{innerSearchQueries:[SearchQuery]}` (§4.1). Each inner query is itself
/// a full `SearchQuery` and may have its own `join`, recursing until a
/// query with no inner joins is reached (§4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Join {
    pub inner_search_queries: Vec<SearchQuery>,
}

/// The query AST root (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub namespace: String,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub join: Option<Join>,
    #[serde(default)]
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub facet: Vec<FacetSpec>,
    #[serde(default)]
    pub return_fields: Vec<String>,
    #[serde(default)]
    pub context_features: Vec<String>,
    #[serde(default)]
    pub phased_sort_by: Vec<PhasedSortKey>,
    #[serde(default)]
    pub dedup: Dedup,
    #[serde(default)]
    pub reorderings: Vec<Reordering>,
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    /// Soft facet-count cutoff (§4.3.3); `None` means "exact, never
    /// approximate".
    #[serde(default)]
    pub total_hits_threshold: Option<u64>,
}

use std::collections::HashMap;

use lattice_schema::{FieldType, Namespace};

use crate::ast::{Filter, Occur, Reordering, SearchQuery, SortKey};
use crate::error::{InvalidQuery, QueryPath};

const NAMESPACE_FIELD: &str = "_namespace";

/// The namespaces a planner validates against. Intentionally just a map:
/// schema lifecycle (loading, hot-reload) is the external ingestion
/// pipeline's concern, not the planner's.
#[derive(Debug, Default)]
pub struct SchemaRegistry(HashMap<String, Namespace>);

impl SchemaRegistry {
    pub fn new(namespaces: impl IntoIterator<Item = Namespace>) -> Self {
        Self(namespaces.into_iter().map(|ns| (ns.name.clone(), ns)).collect())
    }

    pub fn lookup(&self, name: &str) -> Option<&Namespace> {
        self.0.get(name)
    }
}

/// The result of planning: a rewritten, validated query plus metadata the
/// compiler and collector use to skip work (§4.1 rewrite 4).
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub query: SearchQuery,
    /// `true` unless the entire filter tree is provably non-scoring and no
    /// keywords were supplied — lets the collector skip score computation
    /// entirely and sort purely by `_docid` tie-break.
    pub requires_scoring: bool,
}

#[derive(Debug, Default)]
pub struct Planner {
    schema: SchemaRegistry,
}

impl Planner {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self { schema }
    }

    pub fn plan(&self, query: SearchQuery) -> Result<PlannedQuery, InvalidQuery> {
        self.validate(&query, &QueryPath::root())?;
        let requires_scoring = !query.keywords.is_empty()
            || !query.filter.as_ref().map(Filter::is_always_non_scoring).unwrap_or(true);
        let query = self.rewrite(query);
        Ok(PlannedQuery { query, requires_scoring })
    }

    // ---- validation (§4.1) ----

    fn validate(&self, query: &SearchQuery, path: &QueryPath) -> Result<(), InvalidQuery> {
        let ns = self
            .schema
            .lookup(&query.namespace)
            .ok_or_else(|| path.field("namespace").invalid(format!("unknown namespace `{}`", query.namespace)))?;

        if let Some(filter) = &query.filter {
            self.validate_filter(filter, ns, &path.field("filter"))?;
        }

        for (gi, group) in query.keywords.groups.iter().enumerate() {
            let group_path = path.field("keywords").index("groups", gi);
            if group.min_should_match as usize > group.terms.len() {
                return Err(group_path
                    .field("minShouldMatch")
                    .invalid("minShouldMatch exceeds the number of terms in the group"));
            }
        }
        for (vi, vq) in query.keywords.vector_queries.iter().enumerate() {
            let vq_path = path.field("keywords").index("vectorQueries", vi);
            if vq.k == 0 {
                return Err(vq_path.field("k").invalid("k must be > 0"));
            }
            self.validate_vector_field(&vq.field, vq.target.len(), ns, &vq_path)?;
        }

        if let Some(group_by) = &query.group_by {
            if !ns.has_field(&group_by.field) {
                return Err(path
                    .field("groupBy")
                    .invalid(format!("field `{}` does not exist on namespace `{}`", group_by.field, ns.name)));
            }
        }

        for (fi, facet) in query.facet.iter().enumerate() {
            if !ns.has_field(&facet.field) {
                return Err(path
                    .index("facet", fi)
                    .invalid(format!("field `{}` does not exist on namespace `{}`", facet.field, ns.name)));
            }
        }

        for (si, sort_key) in query.phased_sort_by.iter().enumerate() {
            if let SortKey::Field { name } = &sort_key.key {
                if !ns.has_field(name) {
                    return Err(path
                        .index("phasedSortBy", si)
                        .invalid(format!("field `{name}` does not exist on namespace `{}`", ns.name)));
                }
            }
        }

        for field in &query.return_fields {
            if !ns.has_field(field) {
                return Err(path
                    .field("returnFields")
                    .invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name)));
            }
        }

        for reordering in &query.reorderings {
            if let Reordering::BoostByContextFeature { context_feature, .. } = reordering {
                if !query.context_features.iter().any(|f| f == context_feature) {
                    return Err(path.field("reorderings").invalid(format!(
                        "context feature `{context_feature}` is not declared in contextFeatures"
                    )));
                }
            }
        }

        if let Some(join) = &query.join {
            for (ii, inner) in join.inner_search_queries.iter().enumerate() {
                let inner_path = path.field("join").index("innerSearchQueries", ii);
                self.validate(inner, &inner_path)?;
                let candidates = ns.foreign_keys_to(&inner.namespace);
                if candidates.is_empty() {
                    return Err(inner_path.invalid(format!(
                        "namespace `{}` has no foreign key referencing `{}`",
                        ns.name, inner.namespace
                    )));
                }
                if candidates.len() > 1 {
                    return Err(inner_path.invalid(format!(
                        "namespace `{}` has more than one foreign key referencing `{}`; ambiguous join",
                        ns.name, inner.namespace
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_vector_field(
        &self,
        field: &str,
        target_len: usize,
        ns: &Namespace,
        path: &QueryPath,
    ) -> Result<(), InvalidQuery> {
        match ns.field(field).map(|f| &f.field_type) {
            Some(FieldType::Vector { dim }) if *dim as usize == target_len => Ok(()),
            Some(FieldType::Vector { dim }) => Err(path.field("field").invalid(format!(
                "vector field `{field}` has dimension {dim}, target has dimension {target_len}"
            ))),
            Some(_) => Err(path.field("field").invalid(format!("field `{field}` is not a vector field"))),
            None => Err(path
                .field("field")
                .invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name))),
        }
    }

    fn field_type(&self, ns: &Namespace, field: &str) -> Option<FieldType> {
        if field == ns.primary_key_field {
            return Some(FieldType::String);
        }
        ns.field(field).map(|f| f.field_type.clone())
    }

    fn validate_filter(&self, filter: &Filter, ns: &Namespace, path: &QueryPath) -> Result<(), InvalidQuery> {
        match filter {
            Filter::Term { field, value } => {
                let ty = self
                    .field_type(ns, field)
                    .ok_or_else(|| path.field("field").invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name)))?;
                if !ty.accepts(value) {
                    return Err(path.field("value").invalid(format!("value is not compatible with the type of `{field}`")));
                }
                Ok(())
            }
            Filter::TermInSet { field, values } => {
                let ty = self
                    .field_type(ns, field)
                    .ok_or_else(|| path.field("field").invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name)))?;
                for value in values {
                    if !ty.accepts(value) {
                        return Err(path.field("values").invalid(format!("value is not compatible with the type of `{field}`")));
                    }
                }
                Ok(())
            }
            Filter::PointRange { field, lo, hi } => {
                let ty = self
                    .field_type(ns, field)
                    .ok_or_else(|| path.field("field").invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name)))?;
                if !matches!(ty, FieldType::Int64 | FieldType::Double) {
                    return Err(path.field("field").invalid(format!("field `{field}` is not an orderable numeric field")));
                }
                if let Some(lo) = lo {
                    if !ty.accepts(lo) {
                        return Err(path.field("lo").invalid("lo is not compatible with the field's type"));
                    }
                }
                if let Some(hi) = hi {
                    if !ty.accepts(hi) {
                        return Err(path.field("hi").invalid("hi is not compatible with the field's type"));
                    }
                }
                Ok(())
            }
            Filter::GeoDistance { field, lat, lon, meters } => {
                match self.field_type(ns, field) {
                    Some(FieldType::GeoPoint) => {}
                    Some(_) => return Err(path.field("field").invalid(format!("field `{field}` is not a geo-point field"))),
                    None => return Err(path.field("field").invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name))),
                }
                if !lat.is_finite() || !(-90.0..=90.0).contains(lat) {
                    return Err(path.field("lat").invalid("latitude must be finite and in [-90, 90]"));
                }
                if !lon.is_finite() || !(-180.0..=180.0).contains(lon) {
                    return Err(path.field("lon").invalid("longitude must be finite and in [-180, 180]"));
                }
                if !meters.is_finite() || *meters <= 0.0 {
                    return Err(path.field("meters").invalid("radius must be finite and positive"));
                }
                Ok(())
            }
            Filter::Vector { field, target, k, filter } => {
                if *k == 0 {
                    return Err(path.field("k").invalid("k must be > 0"));
                }
                self.validate_vector_field(field, target.len(), ns, path)?;
                if let Some(inner) = filter {
                    self.validate_filter(inner, ns, &path.field("filter"))?;
                }
                Ok(())
            }
            Filter::Boolean { clauses, min_should_match } => {
                let should_count = clauses.iter().filter(|(occur, _)| *occur == Occur::Should).count();
                if *min_should_match as usize > should_count {
                    return Err(path
                        .field("minShouldMatch")
                        .invalid("minShouldMatch exceeds the number of SHOULD clauses"));
                }
                for (ci, (_, child)) in clauses.iter().enumerate() {
                    self.validate_filter(child, ns, &path.index("clauses", ci))?;
                }
                Ok(())
            }
            Filter::ReferenceFieldInSet { field, ref_namespace, ref_field } => {
                if !ns.has_field(field) {
                    return Err(path.field("field").invalid(format!("field `{field}` does not exist on namespace `{}`", ns.name)));
                }
                let ref_ns = self
                    .schema
                    .lookup(ref_namespace)
                    .ok_or_else(|| path.field("refNamespace").invalid(format!("unknown namespace `{ref_namespace}`")))?;
                if !ref_ns.has_field(ref_field) {
                    return Err(path
                        .field("refField")
                        .invalid(format!("field `{ref_field}` does not exist on namespace `{ref_namespace}`")));
                }
                Ok(())
            }
        }
    }

    // ---- rewrites (§4.1) ----

    fn rewrite(&self, mut query: SearchQuery) -> SearchQuery {
        if let Some(join) = query.join.take() {
            let inner = join
                .inner_search_queries
                .into_iter()
                .map(|q| self.rewrite(q))
                .collect();
            query.join = Some(crate::ast::Join { inner_search_queries: inner });
        }

        let namespace = query.namespace.clone();
        let user_filter = query.filter.take().map(rewrite_filter);
        query.filter = Some(push_down_namespace(user_filter, &namespace));
        query
    }
}

/// Rewrite 1: namespace-equality pushdown.
fn push_down_namespace(filter: Option<Filter>, namespace: &str) -> Filter {
    let hidden = Filter::Term {
        field: NAMESPACE_FIELD.to_string(),
        value: lattice_schema::FieldValue::String(namespace.to_string()),
    };
    match filter {
        None => hidden,
        Some(existing) => Filter::Boolean {
            clauses: vec![(Occur::Filter, existing), (Occur::Filter, hidden)],
            min_should_match: 0,
        },
    }
}

/// Rewrites 2 and 3: boolean collapse and double-negative promotion,
/// applied bottom-up so a freshly promoted/flattened node is itself
/// eligible for the parent's rewrite in the same pass.
fn rewrite_filter(filter: Filter) -> Filter {
    match filter {
        Filter::Boolean { clauses, min_should_match } => {
            let mut new_clauses = Vec::with_capacity(clauses.len());
            for (occur, child) in clauses {
                let child = rewrite_filter(child);

                if occur == Occur::MustNot {
                    if let Filter::Boolean { clauses: mut inner, min_should_match: 0 } = child.clone() {
                        if inner.len() == 1 && inner[0].0 == Occur::MustNot {
                            let (_, promoted) = inner.remove(0);
                            new_clauses.push((Occur::Must, promoted));
                            continue;
                        }
                    }
                }

                if matches!(occur, Occur::Must | Occur::Filter) {
                    if let Filter::Boolean { clauses: inner, min_should_match: 0 } = child.clone() {
                        if !inner.iter().any(|(o, _)| *o == Occur::Should) {
                            new_clauses.extend(inner);
                            continue;
                        }
                    }
                }

                new_clauses.push((occur, child));
            }
            Filter::Boolean { clauses: new_clauses, min_should_match }
        }
        Filter::Vector { field, target, k, filter } => Filter::Vector {
            field,
            target,
            k,
            filter: filter.map(|f| Box::new(rewrite_filter(*f))),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_schema::{FieldSchema, ForeignKey, Container};

    fn item_and_store_schema() -> SchemaRegistry {
        let store = Namespace {
            name: "store".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![],
            fields: vec![
                FieldSchema { name: "rating".to_string(), field_type: FieldType::Double, doc_value: true },
                FieldSchema { name: "menu_id".to_string(), field_type: FieldType::Int64, doc_value: true },
            ],
        };
        let item = Namespace {
            name: "item".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![ForeignKey {
                name: "store_id".to_string(),
                container: Container::Scalar,
                children: vec!["store".to_string()],
                required: false,
            }],
            fields: vec![FieldSchema { name: "menu_id".to_string(), field_type: FieldType::Int64, doc_value: true }],
        };
        SchemaRegistry::new([store, item])
    }

    fn base_query(namespace: &str) -> SearchQuery {
        SearchQuery {
            namespace: namespace.to_string(),
            keywords: Default::default(),
            filter: None,
            join: None,
            group_by: None,
            facet: vec![],
            return_fields: vec![],
            context_features: vec![],
            phased_sort_by: vec![],
            dedup: Default::default(),
            reorderings: vec![],
            limit: 10,
            offset: 0,
            total_hits_threshold: None,
        }
    }

    #[test]
    fn rejects_unknown_namespace() {
        let planner = Planner::new(item_and_store_schema());
        let err = planner.plan(base_query("nonexistent")).unwrap_err();
        assert_eq!(err.path, "namespace");
    }

    #[test]
    fn pushes_down_namespace_filter() {
        let planner = Planner::new(item_and_store_schema());
        let planned = planner.plan(base_query("item")).unwrap();
        match planned.query.filter.unwrap() {
            Filter::Term { field, value } => {
                assert_eq!(field, "_namespace");
                assert_eq!(value, lattice_schema::FieldValue::String("item".to_string()));
            }
            other => panic!("expected a pushed-down namespace term, got {other:?}"),
        }
    }

    #[test]
    fn collapses_nested_must_boolean() {
        let planner = Planner::new(item_and_store_schema());
        let mut query = base_query("item");
        query.filter = Some(Filter::Boolean {
            clauses: vec![(
                Occur::Must,
                Filter::Boolean {
                    clauses: vec![
                        (Occur::Must, Filter::Term { field: "menu_id".to_string(), value: lattice_schema::FieldValue::Int64(7) }),
                    ],
                    min_should_match: 0,
                },
            )],
            min_should_match: 0,
        });
        let planned = planner.plan(query).unwrap();
        match planned.query.filter.unwrap() {
            Filter::Boolean { clauses, .. } => {
                // flattened inner MUST clause plus the pushed-down namespace FILTER clause
                assert_eq!(clauses.len(), 2);
                assert!(clauses.iter().any(|(occur, f)| *occur == Occur::Must && matches!(f, Filter::Term { field, .. } if field == "menu_id")));
            }
            other => panic!("expected a boolean filter, got {other:?}"),
        }
    }

    #[test]
    fn promotes_double_negative() {
        let planner = Planner::new(item_and_store_schema());
        let mut query = base_query("item");
        query.filter = Some(Filter::Boolean {
            clauses: vec![(
                Occur::MustNot,
                Filter::Boolean {
                    clauses: vec![(Occur::MustNot, Filter::Term { field: "menu_id".to_string(), value: lattice_schema::FieldValue::Int64(7) })],
                    min_should_match: 0,
                },
            )],
            min_should_match: 0,
        });
        let planned = planner.plan(query).unwrap();
        match planned.query.filter.unwrap() {
            Filter::Boolean { clauses, .. } => {
                assert!(clauses.iter().any(|(occur, f)| *occur == Occur::Must && matches!(f, Filter::Term { field, .. } if field == "menu_id")));
            }
            other => panic!("expected a boolean filter, got {other:?}"),
        }
    }

    #[test]
    fn rejects_ambiguous_join() {
        let mut store = Namespace {
            name: "item".to_string(),
            primary_key_field: "id".to_string(),
            foreign_keys: vec![
                ForeignKey { name: "store_id".to_string(), container: Container::Scalar, children: vec!["store".to_string()], required: false },
                ForeignKey { name: "backup_store_id".to_string(), container: Container::Scalar, children: vec!["store".to_string()], required: false },
            ],
            fields: vec![],
        };
        store.fields.push(FieldSchema { name: "placeholder".to_string(), field_type: FieldType::Boolean, doc_value: false });
        let registry = SchemaRegistry::new([
            store,
            Namespace { name: "store".to_string(), primary_key_field: "id".to_string(), foreign_keys: vec![], fields: vec![] },
        ]);
        let planner = Planner::new(registry);
        let mut query = base_query("item");
        let mut inner = base_query("store");
        inner.limit = 5;
        query.join = Some(crate::ast::Join { inner_search_queries: vec![inner] });
        let err = planner.plan(query).unwrap_err();
        assert!(err.message.contains("ambiguous"));
    }

    #[test]
    fn rejects_min_should_match_too_high() {
        let planner = Planner::new(item_and_store_schema());
        let mut query = base_query("item");
        query.filter = Some(Filter::Boolean {
            clauses: vec![(Occur::Should, Filter::Term { field: "menu_id".to_string(), value: lattice_schema::FieldValue::Int64(1) })],
            min_should_match: 2,
        });
        let err = planner.plan(query).unwrap_err();
        assert!(err.path.ends_with("minShouldMatch"));
    }
}

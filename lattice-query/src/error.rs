use thiserror::Error;

/// Raised by the planner (§4.1). Carries a precise path into the query so
/// the client can locate the offending clause, e.g.
/// `join.innerSearchQueries[1].filter.clauses[0]`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid query at `{path}`: {message}")]
pub struct InvalidQuery {
    pub path: String,
    pub message: String,
}

impl InvalidQuery {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Builds nested paths (`a.b[2].c`) without string-formatting them out by
/// hand at every call site.
#[derive(Debug, Clone, Default)]
pub struct QueryPath(String);

impl QueryPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, name: &str, idx: usize) -> Self {
        Self(format!("{}[{}]", self.field(name).0, idx))
    }

    pub fn invalid(&self, message: impl Into<String>) -> InvalidQuery {
        InvalidQuery::new(self.0.clone(), message)
    }
}

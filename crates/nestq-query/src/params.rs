use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::filter::Where;
use crate::grammar::build_nested_string;
use crate::nested::NestedNode;
use crate::sort::SortSpec;

/// Wire names of the compiled parameters.
pub mod keys {
    pub const WHERE: &str = "where";
    pub const SORT: &str = "sort";
    pub const SELECT: &str = "select";
    pub const NESTED: &str = "nested";
    pub const LIMIT: &str = "limit";
    pub const SKIP: &str = "skip";
    pub const PAGE: &str = "page";
}

/// Compiled parameters, keyed by wire name. Only parameters the caller set
/// are present.
pub type QueryParams = BTreeMap<&'static str, String>;

/// The root request: filter, ordering, projection, relations to include and
/// the pagination window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiClientParams {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Where>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
}

/// Compile a request into flat string parameters.
///
/// `where`, `sort` and `select` are JSON text; `nested` uses the relation
/// grammar; the pagination numbers are decimal text. `Some(0)` is emitted,
/// `None` never is.
pub fn build_query_params(params: &ApiClientParams) -> Result<QueryParams, QueryError> {
    let mut query = QueryParams::new();

    if let Some(filter) = &params.filter {
        filter.check()?;
        query.insert(keys::WHERE, serde_json::to_string(filter)?);
    }
    if let Some(sort) = &params.sort {
        query.insert(keys::SORT, serde_json::to_string(sort)?);
    }
    if let Some(select) = &params.select {
        query.insert(keys::SELECT, serde_json::to_string(select)?);
    }
    if let Some(nested) = &params.nested {
        query.insert(keys::NESTED, build_nested_string(nested)?);
    }
    if let Some(limit) = params.limit {
        query.insert(keys::LIMIT, limit.to_string());
    }
    if let Some(skip) = params.skip {
        query.insert(keys::SKIP, skip.to_string());
    }
    if let Some(page) = params.page {
        query.insert(keys::PAGE, page.to_string());
    }

    tracing::debug!(keys = ?query.keys().collect::<Vec<_>>(), "compiled query params");
    Ok(query)
}

mod error;
mod filter;
mod grammar;
mod nested;
mod operator;
pub mod params;
mod query;
mod response;
mod sort;

pub use error::QueryError;
pub use filter::{Clause, FieldCondition, Where};
pub use grammar::{build_nested_string, parse_nested_string};
pub use nested::{MAX_NESTING_DEPTH, NestedConfig, NestedNode, Relation, RelationSchema};
pub use operator::{Comparison, Operator, Operators};
pub use params::{ApiClientParams, QueryParams, build_query_params};
pub use query::NestedQuery;
pub use response::{ApiGetResponse, Pagination};
pub use sort::{Sort, SortDirection, SortSpec};

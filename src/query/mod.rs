//! Generic query surface: filter AST, per-entity allowlists, pagination
//! normalization, and the evaluator that ties them together.

mod allowlist;
mod evaluator;
mod filter;
mod paginate;

pub use allowlist::{AllowedField, Allowlist, AllowlistRegistry, ALLOWLIST_CACHE_TTL};
pub use evaluator::{QueryEngine, QueryRequest, SortSpec, DEFAULT_SORT_FIELD};
pub use filter::{
    FilterCondition, FilterGroup, FilterLogic, FilterNode, FilterOperator, MAX_FILTER_DEPTH,
};
pub use paginate::{Page, PageRequest, PageWindow, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

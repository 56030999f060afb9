//! tabula - multi-tenant dynamic schema registry and generic query engine
//!
//! Tenants declare tables, fields, and relationships at runtime; records
//! are validated against that schema on every write; one query evaluator
//! serves every entity through allowlist-resolved filters, sorting, and
//! pagination.

pub mod cli;
pub mod context;
pub mod error;
pub mod http;
pub mod observability;
pub mod query;
pub mod records;
pub mod registry;
pub mod storage;

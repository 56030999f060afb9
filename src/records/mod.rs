//! Dynamic record storage: typed value validation and the CRUD service
//! that writes schema-checked, audit-stamped rows.

mod store;
mod value;

pub use store::RecordStore;
pub use value::TypedValue;

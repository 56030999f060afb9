//! Schema Registry subsystem.
//!
//! The metadata layer of the platform builder: operators register tables,
//! fields, and relationships at runtime, and the rest of the engine (record
//! store, allowlist resolver, query evaluator) reads schema truth from
//! here.
//!
//! # Design principles
//!
//! - Structural invariants validated before any storage write
//! - Metadata write and storage provisioning committed atomically
//! - Referential integrity by refusal, never by cascade
//! - Deactivation hides, deletion requires an empty dependency set

mod loader;
mod registry;
mod types;
mod validate;

pub use loader::{MetadataLoader, MetadataSnapshot, TenantEntry};
pub use registry::{record_space, SchemaRegistry};
pub use types::{
    ChoiceOption, CreateField, CreateRelationship, CreateTable, FieldDefinition, FieldType,
    Provisioning, RelationshipDefinition, RelationshipType, TableDefinition, UpdateField,
    UpdateTable,
};
pub use validate::RESERVED_FIELDS;

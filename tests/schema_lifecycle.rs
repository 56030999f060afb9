//! Schema Lifecycle Invariant Tests
//!
//! End-to-end coverage of the registry: table and field lifecycle, the
//! guards that keep schemas consistent, table extension, and metadata
//! persistence across a restart.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use tabula::context::RequestContext;
use tabula::records::RecordStore;
use tabula::registry::{
    CreateField, CreateTable, FieldType, MetadataLoader, SchemaRegistry, UpdateField, UpdateTable,
};
use tabula::storage::{MemoryStore, RowStore};

fn registry() -> SchemaRegistry {
    let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
    SchemaRegistry::new(store).unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::for_user("acme", "alice")
}

fn table(name: &str) -> CreateTable {
    CreateTable {
        name: name.to_string(),
        label: "Test Table".to_string(),
        description: None,
        is_active: true,
        extends: None,
        display_field: None,
        number_prefix: None,
    }
}

fn field(name: &str, ty: FieldType) -> CreateField {
    CreateField {
        field_name: name.to_string(),
        label: name.to_string(),
        field_type: ty,
        is_required: false,
        is_unique: false,
        read_only: false,
        reference_table: None,
        choice_options: None,
        choice_table: None,
        default_value: None,
        max_length: None,
        field_order: 0,
        indexed: false,
        is_active: true,
    }
}

// =============================================================================
// Table lifecycle
// =============================================================================

/// A created table is immediately visible, provisioned, and queryable by
/// name; a second create with the same name conflicts.
#[test]
fn test_table_create_is_atomic_and_unique() {
    let schema = registry();
    let ctx = ctx();

    let def = schema.create_table(&ctx, table("u_asset")).unwrap();
    assert_eq!(def.name, "u_asset");
    assert!(schema.find_table(&ctx, "u_asset").unwrap().is_some());

    let err = schema.create_table(&ctx, table("u_asset")).unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}

/// Table names must match the tenant prefix pattern.
#[test]
fn test_table_name_pattern_enforced() {
    let schema = registry();
    let ctx = ctx();

    for bad in ["asset", "u_Asset", "u_", "u_asset-2", "U_ASSET"] {
        let err = schema.create_table(&ctx, table(bad)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR", "accepted '{}'", bad);
    }
}

/// Deactivating a table removes it from listings without destroying it.
#[test]
fn test_deactivated_table_leaves_listing() {
    let schema = registry();
    let ctx = ctx();
    schema.create_table(&ctx, table("u_asset")).unwrap();

    schema
        .update_table(
            &ctx,
            "u_asset",
            UpdateTable { is_active: Some(false), ..Default::default() },
        )
        .unwrap();

    assert!(schema.list_tables(&ctx).unwrap().is_empty());
    assert!(schema.find_table(&ctx, "u_asset").unwrap().is_some());
}

/// A table with fields or records refuses deletion until they are gone.
#[test]
fn test_delete_guards() {
    let schema = registry();
    let records = RecordStore::new(schema.clone());
    let ctx = ctx();

    schema.create_table(&ctx, table("u_asset")).unwrap();
    schema
        .create_field(&ctx, "u_asset", field("name", FieldType::Text))
        .unwrap();

    let err = schema.delete_table(&ctx, "u_asset").unwrap_err();
    assert_eq!(err.code(), "CONFLICT");

    records
        .create_record(
            &ctx,
            "u_asset",
            [("name".to_string(), json!("laptop"))].into_iter().collect(),
        )
        .unwrap();
    schema.delete_field(&ctx, "u_asset", "name").unwrap_err();

    // A populated fieldless table still refuses deletion.
    let schema2 = registry();
    schema2.create_table(&ctx, table("u_empty")).unwrap();
    schema2.delete_table(&ctx, "u_empty").unwrap();
    assert!(schema2.find_table(&ctx, "u_empty").unwrap().is_none());
}

// =============================================================================
// Field lifecycle
// =============================================================================

/// Field names must not collide with engine-reserved names.
#[test]
fn test_reserved_field_names_rejected() {
    let schema = registry();
    let ctx = ctx();
    schema.create_table(&ctx, table("u_asset")).unwrap();

    for reserved in ["recordId", "createdAt", "deleted"] {
        // Reserved names are camelCase and fail the pattern too; either
        // way the create must not succeed.
        assert!(schema
            .create_field(&ctx, "u_asset", field(reserved, FieldType::Text))
            .is_err());
    }
}

/// Choice fields require options; reference fields require a target.
#[test]
fn test_field_shape_constraints() {
    let schema = registry();
    let ctx = ctx();
    schema.create_table(&ctx, table("u_asset")).unwrap();

    let err = schema
        .create_field(&ctx, "u_asset", field("state", FieldType::Choice))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = schema
        .create_field(&ctx, "u_asset", field("owner", FieldType::Reference))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let mut bad = field("name", FieldType::Text);
    bad.reference_table = Some("u_other".to_string());
    assert!(schema.create_field(&ctx, "u_asset", bad).is_err());
}

/// Changing a field's type is refused once records exist.
#[test]
fn test_type_change_blocked_by_records() {
    let schema = registry();
    let records = RecordStore::new(schema.clone());
    let ctx = ctx();

    schema.create_table(&ctx, table("u_asset")).unwrap();
    schema
        .create_field(&ctx, "u_asset", field("cost", FieldType::Number))
        .unwrap();

    // Type change on an empty table is allowed.
    schema
        .update_field(
            &ctx,
            "u_asset",
            "cost",
            UpdateField { field_type: Some(FieldType::Text), ..Default::default() },
        )
        .unwrap();

    records
        .create_record(
            &ctx,
            "u_asset",
            [("cost".to_string(), json!("12"))].into_iter().collect(),
        )
        .unwrap();

    let err = schema
        .update_field(
            &ctx,
            "u_asset",
            "cost",
            UpdateField { field_type: Some(FieldType::Number), ..Default::default() },
        )
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}

// =============================================================================
// Table extension
// =============================================================================

/// A child table sees its parent's fields, and its own declaration of
/// the same name shadows the parent's.
#[test]
fn test_extension_overlay() {
    let schema = registry();
    let ctx = ctx();

    schema.create_table(&ctx, table("u_task")).unwrap();
    schema
        .create_field(&ctx, "u_task", field("title", FieldType::Text))
        .unwrap();
    schema
        .create_field(&ctx, "u_task", field("priority", FieldType::Number))
        .unwrap();

    let mut child = table("u_incident_task");
    child.extends = Some("u_task".to_string());
    schema.create_table(&ctx, child).unwrap();
    let mut shadow = field("priority", FieldType::Text);
    shadow.label = "Priority Label".to_string();
    schema.create_field(&ctx, "u_incident_task", shadow).unwrap();

    let fields = schema.effective_fields(&ctx, "u_incident_task").unwrap();
    let names: Vec<&str> = fields.iter().map(|f| f.field_name.as_str()).collect();
    assert!(names.contains(&"title"));
    let priority = fields.iter().find(|f| f.field_name == "priority").unwrap();
    assert_eq!(priority.field_type, FieldType::Text);
    assert_eq!(priority.table_name, "u_incident_task");
}

/// Extension is single-level: a child cannot itself be extended.
#[test]
fn test_extension_is_single_level() {
    let schema = registry();
    let ctx = ctx();

    schema.create_table(&ctx, table("u_base")).unwrap();
    let mut mid = table("u_mid");
    mid.extends = Some("u_base".to_string());
    schema.create_table(&ctx, mid).unwrap();

    let mut leaf = table("u_leaf");
    leaf.extends = Some("u_mid".to_string());
    let err = schema.create_table(&ctx, leaf).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

// =============================================================================
// Tenant isolation
// =============================================================================

/// Two tenants can own tables of the same name without interference.
#[test]
fn test_schema_is_tenant_partitioned() {
    let schema = registry();
    let acme = RequestContext::for_tenant("acme");
    let globex = RequestContext::for_tenant("globex");

    schema.create_table(&acme, table("u_asset")).unwrap();
    schema.create_table(&globex, table("u_asset")).unwrap();

    schema
        .create_field(&acme, "u_asset", field("serial", FieldType::Text))
        .unwrap();
    assert!(schema.fields(&globex, "u_asset").unwrap().is_empty());

    schema.delete_table(&globex, "u_asset").unwrap();
    assert!(schema.find_table(&acme, "u_asset").unwrap().is_some());
}

// =============================================================================
// Persistence
// =============================================================================

/// Schema metadata survives a save/load cycle into a fresh engine,
/// including provisioned record spaces and unique indexes.
#[test]
fn test_metadata_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx();

    let schema = registry();
    schema.create_table(&ctx, table("u_asset")).unwrap();
    let mut serial = field("serial", FieldType::Text);
    serial.is_unique = true;
    schema.create_field(&ctx, "u_asset", serial).unwrap();
    MetadataLoader::new(dir.path()).save(&schema).unwrap();

    let reborn = registry();
    MetadataLoader::new(dir.path()).load(&reborn).unwrap();
    assert!(reborn.find_table(&ctx, "u_asset").unwrap().is_some());
    assert_eq!(reborn.fields(&ctx, "u_asset").unwrap().len(), 1);

    // The unique index came back with the metadata.
    let records = RecordStore::new(reborn.clone());
    records
        .create_record(
            &ctx,
            "u_asset",
            [("serial".to_string(), json!("SN-1"))].into_iter().collect(),
        )
        .unwrap();
    let err = records
        .create_record(
            &ctx,
            "u_asset",
            [("serial".to_string(), json!("SN-1"))].into_iter().collect(),
        )
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}

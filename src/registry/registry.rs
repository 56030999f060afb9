//! Schema registry service.
//!
//! Owns table, field, and relationship definitions. Every mutation
//! validates its structural invariants before any storage write, and a
//! table's metadata row and physical record space are committed in one
//! atomic batch, so a failed create leaves neither behind.
//!
//! Metadata lives in three system spaces of the row store; record data for
//! table `t` of tenant `x` lives in its own provisioned space. Referential
//! integrity is enforced by refusing deletes while dependents exist, never
//! by cascading.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::observability::Logger;
use crate::storage::{RowStore, StoreOp};

use super::types::{
    CreateField, CreateRelationship, CreateTable, FieldDefinition, Provisioning,
    RelationshipDefinition, TableDefinition, UpdateField, UpdateTable,
};
use super::validate;

/// System space holding table definitions.
pub const SYS_TABLES: &str = "sys:tables";
/// System space holding field definitions.
pub const SYS_FIELDS: &str = "sys:fields";
/// System space holding relationship definitions.
pub const SYS_RELATIONSHIPS: &str = "sys:relationships";

/// Physical space holding the records of one tenant's table.
pub fn record_space(tenant: &str, table: &str) -> String {
    format!("data:{}:{}", tenant, table)
}

/// The schema registry. Cheap to clone; all state lives in the store.
#[derive(Clone)]
pub struct SchemaRegistry {
    store: Arc<dyn RowStore>,
}

impl SchemaRegistry {
    /// Creates a registry over the given store, provisioning the system
    /// spaces if they are missing.
    pub fn new(store: Arc<dyn RowStore>) -> EngineResult<Self> {
        store.apply(vec![
            StoreOp::Provision { space: SYS_TABLES.to_string() },
            StoreOp::Provision { space: SYS_FIELDS.to_string() },
            StoreOp::Provision { space: SYS_RELATIONSHIPS.to_string() },
        ])?;
        Ok(Self { store })
    }

    /// Shared access to the underlying store.
    pub fn store(&self) -> Arc<dyn RowStore> {
        Arc::clone(&self.store)
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Registers a new table and provisions its record storage atomically.
    ///
    /// The metadata row is staged with a `pending` provisioning marker and
    /// flipped to `ready` in the same batch; a store that cannot apply
    /// batches atomically would commit the pending row first and retry the
    /// provisioning step until the marker flips.
    pub fn create_table(
        &self,
        ctx: &RequestContext,
        req: CreateTable,
    ) -> EngineResult<TableDefinition> {
        validate::check_table_name(&req.name)?;
        validate::check_label(&req.label)?;

        if let Some(parent) = &req.extends {
            let parent_def = self.require_table(ctx, parent)?;
            if parent_def.extends.is_some() {
                return Err(EngineError::validation(
                    "extends",
                    format!("'{}' already extends another table; inheritance is single-level", parent),
                ));
            }
        }

        if self.find_table(ctx, &req.name)?.is_some() {
            return Err(EngineError::conflict(format!(
                "table '{}' already exists",
                req.name
            )));
        }

        let mut def = TableDefinition {
            name: req.name.clone(),
            label: req.label,
            description: req.description,
            is_active: req.is_active,
            is_core: false,
            extends: req.extends,
            display_field: req.display_field,
            number_prefix: req.number_prefix,
            provisioning: Provisioning::Pending,
        };

        let pending = encode(&def)?;
        def.provisioning = Provisioning::Ready;
        let ready = encode(&def)?;

        let space = record_space(&ctx.tenant_id, &def.name);
        self.store.apply(vec![
            StoreOp::Insert {
                space: SYS_TABLES.to_string(),
                tenant: ctx.tenant_id.clone(),
                id: def.name.clone(),
                row: pending,
            },
            StoreOp::Provision { space: space.clone() },
            StoreOp::Put {
                space: SYS_TABLES.to_string(),
                tenant: ctx.tenant_id.clone(),
                id: def.name.clone(),
                row: ready,
            },
        ])?;

        Logger::info(
            "TABLE_CREATED",
            &[("table", &def.name), ("tenant", &ctx.tenant_id)],
        );
        Ok(def)
    }

    /// Updates mutable attributes of a table. `name` is immutable.
    pub fn update_table(
        &self,
        ctx: &RequestContext,
        name: &str,
        patch: UpdateTable,
    ) -> EngineResult<TableDefinition> {
        let mut def = self.require_table(ctx, name)?;

        if let Some(label) = patch.label {
            validate::check_label(&label)?;
            def.label = label;
        }
        if let Some(description) = patch.description {
            def.description = description;
        }
        if let Some(is_active) = patch.is_active {
            def.is_active = is_active;
        }
        // An explicit null in the patch clears the attribute.
        if let Some(display_field) = patch.display_field {
            if let Some(field) = &display_field {
                let known = self
                    .effective_fields(ctx, name)?
                    .iter()
                    .any(|f| &f.field_name == field);
                if !known {
                    return Err(EngineError::validation(
                        "displayField",
                        format!("'{}' is not a field of '{}'", field, name),
                    ));
                }
            }
            def.display_field = display_field;
        }
        if let Some(number_prefix) = patch.number_prefix {
            def.number_prefix = number_prefix;
        }

        self.put_meta(ctx, SYS_TABLES, name, &def)?;
        Ok(def)
    }

    /// Deletes a table. Refused while any field, relationship, child
    /// table, or record still references it; core tables are protected.
    pub fn delete_table(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        let def = self.require_table(ctx, name)?;

        if def.is_core {
            return Err(EngineError::conflict(format!(
                "table '{}' is a protected core table",
                name
            )));
        }

        let field_count = self.fields(ctx, name)?.len();
        if field_count > 0 {
            return Err(EngineError::conflict(format!(
                "table '{}' still has {} field(s)",
                name, field_count
            )));
        }

        if self
            .relationships(ctx)?
            .iter()
            .any(|r| r.from_table == name || r.to_table == name)
        {
            return Err(EngineError::conflict(format!(
                "table '{}' is referenced by a relationship",
                name
            )));
        }

        if self
            .list_all_tables(ctx)?
            .iter()
            .any(|t| t.extends.as_deref() == Some(name))
        {
            return Err(EngineError::conflict(format!(
                "table '{}' is extended by another table",
                name
            )));
        }

        if self.has_records(ctx, name) {
            return Err(EngineError::conflict(format!(
                "table '{}' still has records",
                name
            )));
        }

        self.store.apply(vec![
            StoreOp::Remove {
                space: SYS_TABLES.to_string(),
                tenant: ctx.tenant_id.clone(),
                id: name.to_string(),
            },
            StoreOp::Drop {
                space: record_space(&ctx.tenant_id, name),
            },
        ])?;

        Logger::info("TABLE_DELETED", &[("table", name), ("tenant", &ctx.tenant_id)]);
        Ok(())
    }

    /// Registers a built-in table. Exempt from the user name pattern,
    /// marked core (protected from deletion), and idempotent so it can run
    /// at every boot.
    pub fn seed_core_table(
        &self,
        ctx: &RequestContext,
        name: &str,
        label: &str,
    ) -> EngineResult<TableDefinition> {
        if let Some(existing) = self.find_table(ctx, name)? {
            return Ok(existing);
        }

        let def = TableDefinition {
            name: name.to_string(),
            label: label.to_string(),
            description: None,
            is_active: true,
            is_core: true,
            extends: None,
            display_field: None,
            number_prefix: None,
            provisioning: Provisioning::Ready,
        };

        self.store.apply(vec![
            StoreOp::Insert {
                space: SYS_TABLES.to_string(),
                tenant: ctx.tenant_id.clone(),
                id: name.to_string(),
                row: encode(&def)?,
            },
            StoreOp::Provision {
                space: record_space(&ctx.tenant_id, name),
            },
        ])?;
        Ok(def)
    }

    /// Looks up a table, including inactive ones.
    pub fn find_table(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> EngineResult<Option<TableDefinition>> {
        match self.store.get(SYS_TABLES, &ctx.tenant_id, name) {
            Some(row) => Ok(Some(decode(row)?)),
            None => Ok(None),
        }
    }

    /// Looks up a table or fails with not-found.
    pub fn require_table(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> EngineResult<TableDefinition> {
        self.find_table(ctx, name)?
            .ok_or_else(|| EngineError::not_found(format!("table '{}'", name)))
    }

    /// Active tables, sorted by name.
    pub fn list_tables(&self, ctx: &RequestContext) -> EngineResult<Vec<TableDefinition>> {
        Ok(self
            .list_all_tables(ctx)?
            .into_iter()
            .filter(|t| t.is_active)
            .collect())
    }

    /// All tables including inactive ones, sorted by name.
    pub fn list_all_tables(&self, ctx: &RequestContext) -> EngineResult<Vec<TableDefinition>> {
        let mut tables: Vec<TableDefinition> = self
            .store
            .scan(SYS_TABLES, &ctx.tenant_id)
            .into_iter()
            .map(decode)
            .collect::<EngineResult<_>>()?;
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    /// Whether any record rows (including soft-deleted ones) exist.
    pub fn has_records(&self, ctx: &RequestContext, table: &str) -> bool {
        !self
            .store
            .scan(&record_space(&ctx.tenant_id, table), &ctx.tenant_id)
            .is_empty()
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Registers a field on an existing table.
    pub fn create_field(
        &self,
        ctx: &RequestContext,
        table: &str,
        req: CreateField,
    ) -> EngineResult<FieldDefinition> {
        self.require_table(ctx, table)?;

        let def = FieldDefinition {
            table_name: table.to_string(),
            field_name: req.field_name,
            label: req.label,
            field_type: req.field_type,
            is_required: req.is_required,
            is_unique: req.is_unique,
            read_only: req.read_only,
            reference_table: req.reference_table,
            choice_options: req.choice_options,
            choice_table: req.choice_table,
            default_value: req.default_value,
            max_length: req.max_length,
            field_order: req.field_order,
            indexed: req.indexed,
            is_active: req.is_active,
        };

        validate::check_field_shape(&def)?;
        self.check_field_targets(ctx, &def)?;

        if self.find_field(ctx, table, &def.field_name)?.is_some() {
            return Err(EngineError::conflict(format!(
                "field '{}' already exists on '{}'",
                def.field_name, table
            )));
        }

        self.store.apply(vec![StoreOp::Insert {
            space: SYS_FIELDS.to_string(),
            tenant: ctx.tenant_id.clone(),
            id: field_id(table, &def.field_name),
            row: encode(&def)?,
        }])?;

        if def.is_unique {
            self.store
                .declare_unique(&record_space(&ctx.tenant_id, table), &def.field_name);
        }

        Logger::info(
            "FIELD_CREATED",
            &[
                ("field", &def.field_name),
                ("table", table),
                ("tenant", &ctx.tenant_id),
            ],
        );
        Ok(def)
    }

    /// Updates mutable attributes of a field. `fieldName` is immutable and
    /// the `type` may not change once records exist for the table.
    pub fn update_field(
        &self,
        ctx: &RequestContext,
        table: &str,
        field_name: &str,
        patch: UpdateField,
    ) -> EngineResult<FieldDefinition> {
        let current = self.require_field(ctx, table, field_name)?;
        let mut def = current.clone();

        if let Some(field_type) = patch.field_type {
            if field_type != current.field_type && self.has_records(ctx, table) {
                return Err(EngineError::conflict(format!(
                    "cannot change type of '{}' while '{}' has records",
                    field_name, table
                )));
            }
            def.field_type = field_type;
        }
        if let Some(label) = patch.label {
            def.label = label;
        }
        if let Some(is_required) = patch.is_required {
            def.is_required = is_required;
        }
        if let Some(is_unique) = patch.is_unique {
            def.is_unique = is_unique;
        }
        if let Some(read_only) = patch.read_only {
            def.read_only = read_only;
        }
        // An explicit null in the patch clears the attribute; the shape
        // check below still refuses clears that leave the field invalid.
        if let Some(reference_table) = patch.reference_table {
            def.reference_table = reference_table;
        }
        if let Some(choice_options) = patch.choice_options {
            def.choice_options = choice_options;
        }
        if let Some(choice_table) = patch.choice_table {
            def.choice_table = choice_table;
        }
        if let Some(default_value) = patch.default_value {
            def.default_value = default_value;
        }
        if let Some(max_length) = patch.max_length {
            def.max_length = max_length;
        }
        if let Some(field_order) = patch.field_order {
            def.field_order = field_order;
        }
        if let Some(indexed) = patch.indexed {
            def.indexed = indexed;
        }
        if let Some(is_active) = patch.is_active {
            def.is_active = is_active;
        }

        validate::check_field_shape(&def)?;
        self.check_field_targets(ctx, &def)?;

        let space = record_space(&ctx.tenant_id, table);
        if def.is_unique && !current.is_unique {
            self.check_existing_values_unique(ctx, table, field_name)?;
        }

        self.put_meta(ctx, SYS_FIELDS, &field_id(table, field_name), &def)?;

        if def.is_unique && !current.is_unique {
            self.store.declare_unique(&space, field_name);
        } else if !def.is_unique && current.is_unique {
            self.store.retract_unique(&space, field_name);
        }

        Ok(def)
    }

    /// Deletes a field. Refused while records still carry data for it or
    /// while it is the table's display field.
    pub fn delete_field(
        &self,
        ctx: &RequestContext,
        table: &str,
        field_name: &str,
    ) -> EngineResult<()> {
        let def = self.require_field(ctx, table, field_name)?;
        let tdef = self.require_table(ctx, table)?;

        if tdef.display_field.as_deref() == Some(field_name) {
            return Err(EngineError::conflict(format!(
                "field '{}' is the display field of '{}'",
                field_name, table
            )));
        }

        let space = record_space(&ctx.tenant_id, table);
        let carries_data = self
            .store
            .scan(&space, &ctx.tenant_id)
            .iter()
            .any(|row| row.get(field_name).is_some_and(|v| !v.is_null()));
        if carries_data {
            return Err(EngineError::conflict(format!(
                "records of '{}' still carry data for '{}'",
                table, field_name
            )));
        }

        self.store.apply(vec![StoreOp::Remove {
            space: SYS_FIELDS.to_string(),
            tenant: ctx.tenant_id.clone(),
            id: field_id(table, field_name),
        }])?;

        if def.is_unique {
            self.store.retract_unique(&space, field_name);
        }
        Ok(())
    }

    /// Looks up a field of a table.
    pub fn find_field(
        &self,
        ctx: &RequestContext,
        table: &str,
        field_name: &str,
    ) -> EngineResult<Option<FieldDefinition>> {
        match self
            .store
            .get(SYS_FIELDS, &ctx.tenant_id, &field_id(table, field_name))
        {
            Some(row) => Ok(Some(decode(row)?)),
            None => Ok(None),
        }
    }

    /// Looks up a field or fails with not-found.
    pub fn require_field(
        &self,
        ctx: &RequestContext,
        table: &str,
        field_name: &str,
    ) -> EngineResult<FieldDefinition> {
        self.find_field(ctx, table, field_name)?.ok_or_else(|| {
            EngineError::not_found(format!("field '{}' on table '{}'", field_name, table))
        })
    }

    /// Fields declared directly on a table, in display order.
    pub fn fields(&self, ctx: &RequestContext, table: &str) -> EngineResult<Vec<FieldDefinition>> {
        let mut fields: Vec<FieldDefinition> = self
            .store
            .scan(SYS_FIELDS, &ctx.tenant_id)
            .into_iter()
            .map(decode)
            .collect::<EngineResult<Vec<FieldDefinition>>>()?
            .into_iter()
            .filter(|f| f.table_name == table)
            .collect();
        fields.sort_by(|a, b| {
            a.field_order
                .cmp(&b.field_order)
                .then_with(|| a.field_name.cmp(&b.field_name))
        });
        Ok(fields)
    }

    /// Fields of a table including those inherited from its parent. A
    /// field declared on the child shadows a parent field of the same name.
    pub fn effective_fields(
        &self,
        ctx: &RequestContext,
        table: &str,
    ) -> EngineResult<Vec<FieldDefinition>> {
        let def = self.require_table(ctx, table)?;
        let own = self.fields(ctx, table)?;

        let Some(parent) = &def.extends else {
            return Ok(own);
        };

        let mut merged = self.fields(ctx, parent)?;
        merged.retain(|p| !own.iter().any(|f| f.field_name == p.field_name));
        merged.extend(own);
        merged.sort_by(|a, b| {
            a.field_order
                .cmp(&b.field_order)
                .then_with(|| a.field_name.cmp(&b.field_name))
        });
        Ok(merged)
    }

    /// Active effective fields; the set record writes and queries see.
    pub fn active_fields(
        &self,
        ctx: &RequestContext,
        table: &str,
    ) -> EngineResult<Vec<FieldDefinition>> {
        Ok(self
            .effective_fields(ctx, table)?
            .into_iter()
            .filter(|f| f.is_active)
            .collect())
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    /// Registers a relationship between two existing tables.
    pub fn create_relationship(
        &self,
        ctx: &RequestContext,
        req: CreateRelationship,
    ) -> EngineResult<RelationshipDefinition> {
        let def = RelationshipDefinition {
            name: req.name,
            from_table: req.from_table,
            to_table: req.to_table,
            rel_type: req.rel_type,
            fk_column: req.fk_column,
            m2m_table: req.m2m_table,
            is_active: req.is_active,
        };

        validate::check_relationship_shape(&def)?;
        self.require_table(ctx, &def.from_table)?;
        self.require_table(ctx, &def.to_table)?;

        if self
            .store
            .get(SYS_RELATIONSHIPS, &ctx.tenant_id, &def.name)
            .is_some()
        {
            return Err(EngineError::conflict(format!(
                "relationship '{}' already exists",
                def.name
            )));
        }

        self.store.apply(vec![StoreOp::Insert {
            space: SYS_RELATIONSHIPS.to_string(),
            tenant: ctx.tenant_id.clone(),
            id: def.name.clone(),
            row: encode(&def)?,
        }])?;

        Logger::info(
            "RELATIONSHIP_CREATED",
            &[("relationship", &def.name), ("tenant", &ctx.tenant_id)],
        );
        Ok(def)
    }

    /// Deletes a relationship.
    pub fn delete_relationship(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        if self.store.get(SYS_RELATIONSHIPS, &ctx.tenant_id, name).is_none() {
            return Err(EngineError::not_found(format!("relationship '{}'", name)));
        }
        self.store.apply(vec![StoreOp::Remove {
            space: SYS_RELATIONSHIPS.to_string(),
            tenant: ctx.tenant_id.clone(),
            id: name.to_string(),
        }])
    }

    /// All relationships of the tenant, sorted by name.
    pub fn relationships(
        &self,
        ctx: &RequestContext,
    ) -> EngineResult<Vec<RelationshipDefinition>> {
        let mut rels: Vec<RelationshipDefinition> = self
            .store
            .scan(SYS_RELATIONSHIPS, &ctx.tenant_id)
            .into_iter()
            .map(decode)
            .collect::<EngineResult<_>>()?;
        rels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rels)
    }

    /// Relationships touching a table, on either side.
    pub fn relationships_for(
        &self,
        ctx: &RequestContext,
        table: &str,
    ) -> EngineResult<Vec<RelationshipDefinition>> {
        Ok(self
            .relationships(ctx)?
            .into_iter()
            .filter(|r| r.from_table == table || r.to_table == table)
            .collect())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Cross-table targets of a field (reference target, external choice
    /// source) must name existing tables.
    fn check_field_targets(
        &self,
        ctx: &RequestContext,
        def: &FieldDefinition,
    ) -> EngineResult<()> {
        if let Some(target) = &def.reference_table {
            if self.find_table(ctx, target)?.is_none() {
                return Err(EngineError::validation(
                    "referenceTable",
                    format!("unknown table '{}'", target),
                ));
            }
        }
        if let Some(source) = &def.choice_table {
            if self.find_table(ctx, source)?.is_none() {
                return Err(EngineError::validation(
                    "choiceTable",
                    format!("unknown table '{}'", source),
                ));
            }
        }
        Ok(())
    }

    /// Refuses turning on `isUnique` while stored values already collide.
    fn check_existing_values_unique(
        &self,
        ctx: &RequestContext,
        table: &str,
        field_name: &str,
    ) -> EngineResult<()> {
        let rows = self
            .store
            .scan(&record_space(&ctx.tenant_id, table), &ctx.tenant_id);
        let mut seen = Vec::new();
        for row in &rows {
            let Some(value) = row.get(field_name) else { continue };
            if value.is_null() {
                continue;
            }
            if seen.contains(&value) {
                return Err(EngineError::conflict(format!(
                    "existing records of '{}' have duplicate values for '{}'",
                    table, field_name
                )));
            }
            seen.push(value);
        }
        Ok(())
    }

    fn put_meta<T: serde::Serialize>(
        &self,
        ctx: &RequestContext,
        space: &str,
        id: &str,
        def: &T,
    ) -> EngineResult<()> {
        self.store.apply(vec![StoreOp::Put {
            space: space.to_string(),
            tenant: ctx.tenant_id.clone(),
            id: id.to_string(),
            row: encode(def)?,
        }])
    }
}

fn field_id(table: &str, field: &str) -> String {
    format!("{}.{}", table, field)
}

fn encode<T: serde::Serialize>(def: &T) -> EngineResult<Value> {
    serde_json::to_value(def).map_err(|e| EngineError::internal(format!("encode metadata: {}", e)))
}

fn decode<T: DeserializeOwned>(row: Value) -> EngineResult<T> {
    serde_json::from_value(row)
        .map_err(|e| EngineError::internal(format!("corrupt metadata row: {}", e)))
}

//! Validated writes against dynamic tables.
//!
//! `RecordStore` is the only path that mutates record rows. Every write
//! is validated against the table's effective schema, stamped with the
//! engine-owned audit fields, and applied as one atomic batch. Deletes
//! are soft: the row stays in the space with `deleted` set, invisible to
//! reads and queries but still counted by schema guards such as the
//! refusal to drop a table that has records.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::observability::Logger;
use crate::registry::{record_space, FieldDefinition, SchemaRegistry, RESERVED_FIELDS};
use crate::storage::StoreOp;

use super::value::TypedValue;

/// CRUD over the rows of dynamic tables.
#[derive(Clone)]
pub struct RecordStore {
    schema: SchemaRegistry,
}

impl RecordStore {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self { schema }
    }

    /// Creates a record.
    ///
    /// Unknown keys are rejected rather than silently dropped, so a typo
    /// in a client payload surfaces as an error instead of lost data.
    /// The engine stamps `recordId`, `number`, the audit fields, and
    /// `deleted`; clients cannot supply them.
    pub fn create_record(
        &self,
        ctx: &RequestContext,
        table: &str,
        data: Map<String, Value>,
    ) -> EngineResult<Value> {
        let def = self.require_active_table(ctx, table)?;
        let fields = self.schema.active_fields(ctx, table)?;

        let mut row = Map::new();
        self.apply_payload(ctx, &fields, data, &mut row, false)?;
        apply_defaults(&fields, &mut row)?;
        check_required(&fields, &row)?;

        let id = Uuid::new_v4().to_string();
        let now = timestamp();
        let actor = ctx.actor().to_string();
        row.insert("recordId".to_string(), json!(id));
        if let Some(prefix) = &def.number_prefix {
            row.insert("number".to_string(), json!(self.next_number(ctx, table, prefix)));
        }
        row.insert("createdAt".to_string(), json!(now));
        row.insert("createdBy".to_string(), json!(actor));
        row.insert("updatedAt".to_string(), json!(now));
        row.insert("updatedBy".to_string(), json!(actor));
        row.insert("deleted".to_string(), json!(false));

        let row = Value::Object(row);
        self.schema.store().apply(vec![StoreOp::Insert {
            space: record_space(&ctx.tenant_id, table),
            tenant: ctx.tenant_id.clone(),
            id: id.clone(),
            row: row.clone(),
        }])?;

        Logger::info(
            "RECORD_CREATED",
            &[("table", table), ("record", &id), ("tenant", &ctx.tenant_id)],
        );
        Ok(row)
    }

    /// Fetches a record. Soft-deleted rows are not found.
    pub fn get_record(
        &self,
        ctx: &RequestContext,
        table: &str,
        id: &str,
    ) -> EngineResult<Value> {
        self.require_active_table(ctx, table)?;
        self.schema
            .store()
            .get(&record_space(&ctx.tenant_id, table), &ctx.tenant_id, id)
            .filter(|row| !is_deleted(row))
            .ok_or_else(|| EngineError::not_found(format!("record '{}' in '{}'", id, table)))
    }

    /// Applies a partial update. Reserved and read-only fields cannot be
    /// written; everything else is re-validated against the schema.
    pub fn update_record(
        &self,
        ctx: &RequestContext,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> EngineResult<Value> {
        let existing = self.get_record(ctx, table, id)?;
        let fields = self.schema.active_fields(ctx, table)?;

        let mut row = match existing {
            Value::Object(map) => map,
            _ => return Err(EngineError::internal("record row is not an object")),
        };
        self.apply_payload(ctx, &fields, patch, &mut row, true)?;
        check_required(&fields, &row)?;

        row.insert("updatedAt".to_string(), json!(timestamp()));
        row.insert("updatedBy".to_string(), json!(ctx.actor()));

        let row = Value::Object(row);
        self.schema.store().apply(vec![StoreOp::Put {
            space: record_space(&ctx.tenant_id, table),
            tenant: ctx.tenant_id.clone(),
            id: id.to_string(),
            row: row.clone(),
        }])?;

        Logger::info(
            "RECORD_UPDATED",
            &[("table", table), ("record", id), ("tenant", &ctx.tenant_id)],
        );
        Ok(row)
    }

    /// Soft-deletes a record. The row keeps its data and audit trail.
    pub fn delete_record(
        &self,
        ctx: &RequestContext,
        table: &str,
        id: &str,
    ) -> EngineResult<()> {
        let existing = self.get_record(ctx, table, id)?;
        let mut row = match existing {
            Value::Object(map) => map,
            _ => return Err(EngineError::internal("record row is not an object")),
        };
        row.insert("deleted".to_string(), json!(true));
        row.insert("updatedAt".to_string(), json!(timestamp()));
        row.insert("updatedBy".to_string(), json!(ctx.actor()));

        self.schema.store().apply(vec![StoreOp::Put {
            space: record_space(&ctx.tenant_id, table),
            tenant: ctx.tenant_id.clone(),
            id: id.to_string(),
            row: Value::Object(row),
        }])?;

        Logger::info(
            "RECORD_DELETED",
            &[("table", table), ("record", id), ("tenant", &ctx.tenant_id)],
        );
        Ok(())
    }

    fn require_active_table(
        &self,
        ctx: &RequestContext,
        table: &str,
    ) -> EngineResult<crate::registry::TableDefinition> {
        let def = self.schema.require_table(ctx, table)?;
        if !def.is_active {
            return Err(EngineError::not_found(format!("table '{}'", table)));
        }
        Ok(def)
    }

    /// Validates a client payload field by field and writes the typed
    /// values into `row`. `is_update` additionally blocks read-only fields.
    fn apply_payload(
        &self,
        ctx: &RequestContext,
        fields: &[FieldDefinition],
        data: Map<String, Value>,
        row: &mut Map<String, Value>,
        is_update: bool,
    ) -> EngineResult<()> {
        for (key, raw) in data {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                return Err(EngineError::validation(
                    key.clone(),
                    "engine-managed field cannot be set by clients",
                ));
            }
            let Some(field) = fields.iter().find(|f| f.field_name == key) else {
                return Err(EngineError::validation(
                    key.clone(),
                    "unknown field for this table",
                ));
            };
            if is_update && field.read_only {
                return Err(EngineError::validation(key.clone(), "field is read-only"));
            }
            let value = TypedValue::from_json(field, raw)?;
            if let (TypedValue::Reference(id), Some(target)) =
                (&value, &field.reference_table)
            {
                self.check_reference(ctx, &key, id, target)?;
            }
            row.insert(key, value.into_json());
        }
        Ok(())
    }

    /// A reference value must point at a live row of the target table in
    /// the same tenant.
    fn check_reference(
        &self,
        ctx: &RequestContext,
        field: &str,
        id: &str,
        reference_table: &str,
    ) -> EngineResult<()> {
        let found = self
            .schema
            .store()
            .get(&record_space(&ctx.tenant_id, reference_table), &ctx.tenant_id, id)
            .filter(|row| !is_deleted(row));
        if found.is_none() {
            return Err(EngineError::validation(
                field,
                format!("referenced record '{}' not found in '{}'", id, reference_table),
            ));
        }
        Ok(())
    }

    /// Record numbers are sequential per table within a tenant, derived
    /// from the row count including soft-deleted rows so numbers are
    /// never reused.
    fn next_number(&self, ctx: &RequestContext, table: &str, prefix: &str) -> String {
        let count = self
            .schema
            .store()
            .scan(&record_space(&ctx.tenant_id, table), &ctx.tenant_id)
            .len();
        format!("{}{:07}", prefix, count + 1)
    }
}

fn apply_defaults(fields: &[FieldDefinition], row: &mut Map<String, Value>) -> EngineResult<()> {
    for field in fields {
        if row.contains_key(&field.field_name) {
            continue;
        }
        if let Some(default) = &field.default_value {
            let value = TypedValue::from_json(field, default.clone())?;
            row.insert(field.field_name.clone(), value.into_json());
        }
    }
    Ok(())
}

fn check_required(fields: &[FieldDefinition], row: &Map<String, Value>) -> EngineResult<()> {
    for field in fields {
        if !field.is_required {
            continue;
        }
        let missing = match row.get(&field.field_name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing {
            return Err(EngineError::validation(
                field.field_name.clone(),
                "required field is missing",
            ));
        }
    }
    Ok(())
}

fn is_deleted(row: &Value) -> bool {
    row.get("deleted").and_then(Value::as_bool).unwrap_or(false)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! Allowlist resolution.
//!
//! Per queryable entity, the authoritative set of fields that may appear
//! in sort specs, filter conditions, and free-text search. Client-supplied
//! field names never reach the storage layer without passing through this
//! set. Built-in entities register fixed lists at process start; dynamic
//! entities derive theirs live from the schema registry's active fields,
//! so a newly added field becomes queryable without a code change.
//!
//! Resolutions are cached with a short TTL. A stale entry only delays a
//! new field's appearance; it can never widen the query surface.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::registry::{FieldType, SchemaRegistry};

/// How long a resolved allowlist may be served from cache.
pub const ALLOWLIST_CACHE_TTL: Duration = Duration::from_secs(30);

/// One field exposed to query controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedField {
    pub name: String,
    pub label: String,
    /// Comparison class: string, number, boolean, or date
    pub comparison: String,
}

impl AllowedField {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        comparison: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            comparison: comparison.into(),
        }
    }
}

/// The resolved query surface of one entity.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowlist {
    pub sortable_fields: Vec<AllowedField>,
    pub filterable_fields: Vec<AllowedField>,
    pub searchable_fields: Vec<AllowedField>,
}

impl Allowlist {
    pub fn is_sortable(&self, field: &str) -> bool {
        self.sortable_fields.iter().any(|f| f.name == field)
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.filterable_fields.iter().any(|f| f.name == field)
    }

    pub fn searchable_names(&self) -> Vec<&str> {
        self.searchable_fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Resolves allowlists for every queryable entity.
pub struct AllowlistRegistry {
    schema: SchemaRegistry,
    static_entries: HashMap<String, Allowlist>,
    cache: RwLock<HashMap<(String, String), (Instant, Allowlist)>>,
    ttl: Duration,
}

impl AllowlistRegistry {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self {
            schema,
            static_entries: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
            ttl: ALLOWLIST_CACHE_TTL,
        }
    }

    /// Overrides the cache TTL (tests use zero).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Registers the fixed allowlist of a built-in entity. Called once at
    /// process start, before the registry serves queries.
    pub fn register_static(&mut self, entity: impl Into<String>, allowlist: Allowlist) {
        self.static_entries.insert(entity.into(), allowlist);
    }

    /// Resolves an entity's allowlist: static table first, then the live
    /// schema registry for dynamic entities.
    pub fn resolve(&self, ctx: &RequestContext, entity: &str) -> EngineResult<Allowlist> {
        if let Some(fixed) = self.static_entries.get(entity) {
            return Ok(fixed.clone());
        }

        let key = (ctx.tenant_id.clone(), entity.to_string());
        {
            let cache = self.cache.read().unwrap();
            if let Some((at, list)) = cache.get(&key) {
                if at.elapsed() < self.ttl {
                    return Ok(list.clone());
                }
            }
        }

        let resolved = self.resolve_dynamic(ctx, entity)?;
        self.cache
            .write()
            .unwrap()
            .insert(key, (Instant::now(), resolved.clone()));
        Ok(resolved)
    }

    fn resolve_dynamic(&self, ctx: &RequestContext, entity: &str) -> EngineResult<Allowlist> {
        if self.schema.find_table(ctx, entity)?.is_none() {
            return Err(EngineError::not_found(format!("entity '{}'", entity)));
        }

        let mut list = Allowlist::default();
        for stamped in engine_fields() {
            list.sortable_fields.push(stamped.clone());
            list.filterable_fields.push(stamped.clone());
            if stamped.comparison == "string" {
                list.searchable_fields.push(stamped);
            }
        }

        for field in self.schema.active_fields(ctx, entity)? {
            let allowed = AllowedField::new(
                &field.field_name,
                &field.label,
                field.field_type.comparison(),
            );
            list.sortable_fields.push(allowed.clone());
            list.filterable_fields.push(allowed.clone());
            if matches!(field.field_type, FieldType::Text | FieldType::Choice) {
                list.searchable_fields.push(allowed);
            }
        }
        Ok(list)
    }
}

/// Fields the engine stamps on every record; always queryable.
fn engine_fields() -> Vec<AllowedField> {
    vec![
        AllowedField::new("number", "Number", "string"),
        AllowedField::new("createdAt", "Created", "date"),
        AllowedField::new("updatedAt", "Updated", "date"),
    ]
}

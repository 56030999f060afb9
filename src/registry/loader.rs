//! Metadata persistence.
//!
//! The registry's metadata (tables, fields, relationships, across all
//! tenants) is snapshotted to JSON files under `<data_dir>/metadata/` and
//! reloaded at boot. One file per metadata kind. A malformed snapshot file
//! fails the load; a missing one is simply an empty registry.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::observability::Logger;

use super::registry::SchemaRegistry;
use super::types::{FieldDefinition, RelationshipDefinition, TableDefinition};

/// One metadata item together with the tenant owning it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEntry<T> {
    pub tenant: String,
    pub item: T,
}

/// Full registry metadata, across all tenants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub tables: Vec<TenantEntry<TableDefinition>>,
    pub fields: Vec<TenantEntry<FieldDefinition>>,
    pub relationships: Vec<TenantEntry<RelationshipDefinition>>,
}

/// Reads and writes registry metadata snapshots on disk.
pub struct MetadataLoader {
    dir: PathBuf,
}

impl MetadataLoader {
    /// Loader rooted at `<data_dir>/metadata/`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("metadata"),
        }
    }

    /// Snapshot directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the registry's current metadata to disk.
    pub fn save(&self, registry: &SchemaRegistry) -> EngineResult<()> {
        let snapshot = registry.export()?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| EngineError::internal(format!("create metadata dir: {}", e)))?;

        write_json(&self.dir.join("tables.json"), &snapshot.tables)?;
        write_json(&self.dir.join("fields.json"), &snapshot.fields)?;
        write_json(&self.dir.join("relationships.json"), &snapshot.relationships)?;

        Logger::info(
            "METADATA_SAVED",
            &[("dir", &self.dir.display().to_string())],
        );
        Ok(())
    }

    /// Loads a snapshot from disk into the registry. Missing files mean an
    /// empty registry; malformed files fail the boot.
    pub fn load(&self, registry: &SchemaRegistry) -> EngineResult<()> {
        let snapshot = MetadataSnapshot {
            tables: read_json(&self.dir.join("tables.json"))?,
            fields: read_json(&self.dir.join("fields.json"))?,
            relationships: read_json(&self.dir.join("relationships.json"))?,
        };

        let count = snapshot.tables.len();
        registry.import(snapshot)?;

        Logger::info(
            "METADATA_LOADED",
            &[
                ("dir", &self.dir.display().to_string()),
                ("tables", &count.to_string()),
            ],
        );
        Ok(())
    }
}

impl SchemaRegistry {
    /// Exports all metadata across tenants.
    pub fn export(&self) -> EngineResult<MetadataSnapshot> {
        Ok(MetadataSnapshot {
            tables: self.export_space::<TableDefinition>(super::registry::SYS_TABLES)?,
            fields: self.export_space::<FieldDefinition>(super::registry::SYS_FIELDS)?,
            relationships: self
                .export_space::<RelationshipDefinition>(super::registry::SYS_RELATIONSHIPS)?,
        })
    }

    /// Imports a snapshot, re-provisioning record spaces and re-declaring
    /// unique indexes. Idempotent: existing rows are overwritten.
    pub fn import(&self, snapshot: MetadataSnapshot) -> EngineResult<()> {
        use crate::storage::StoreOp;

        let mut ops = Vec::new();
        for entry in &snapshot.tables {
            ops.push(StoreOp::Put {
                space: super::registry::SYS_TABLES.to_string(),
                tenant: entry.tenant.clone(),
                id: entry.item.name.clone(),
                row: serde_json::to_value(&entry.item)
                    .map_err(|e| EngineError::internal(format!("encode metadata: {}", e)))?,
            });
            ops.push(StoreOp::Provision {
                space: super::registry::record_space(&entry.tenant, &entry.item.name),
            });
        }
        for entry in &snapshot.fields {
            ops.push(StoreOp::Put {
                space: super::registry::SYS_FIELDS.to_string(),
                tenant: entry.tenant.clone(),
                id: format!("{}.{}", entry.item.table_name, entry.item.field_name),
                row: serde_json::to_value(&entry.item)
                    .map_err(|e| EngineError::internal(format!("encode metadata: {}", e)))?,
            });
        }
        for entry in &snapshot.relationships {
            ops.push(StoreOp::Put {
                space: super::registry::SYS_RELATIONSHIPS.to_string(),
                tenant: entry.tenant.clone(),
                id: entry.item.name.clone(),
                row: serde_json::to_value(&entry.item)
                    .map_err(|e| EngineError::internal(format!("encode metadata: {}", e)))?,
            });
        }
        self.store().apply(ops)?;

        for entry in &snapshot.fields {
            if entry.item.is_unique {
                self.store().declare_unique(
                    &super::registry::record_space(&entry.tenant, &entry.item.table_name),
                    &entry.item.field_name,
                );
            }
        }
        Ok(())
    }

    fn export_space<T: DeserializeOwned>(&self, space: &str) -> EngineResult<Vec<TenantEntry<T>>> {
        self.store()
            .scan_all(space)
            .into_iter()
            .map(|(tenant, row)| {
                let item = serde_json::from_value(row)
                    .map_err(|e| EngineError::internal(format!("corrupt metadata row: {}", e)))?;
                Ok(TenantEntry { tenant, item })
            })
            .collect()
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::internal(format!("encode snapshot: {}", e)))?;
    fs::write(path, text)
        .map_err(|e| EngineError::internal(format!("write '{}': {}", path.display(), e)))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> EngineResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)
        .map_err(|e| EngineError::internal(format!("read '{}': {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| EngineError::internal(format!("malformed snapshot '{}': {}", path.display(), e)))
}

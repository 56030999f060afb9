//! In-memory row store.
//!
//! Rows are kept per space, partitioned by tenant, ordered by id. Batches
//! are applied against a working copy of the whole state and swapped in on
//! success, which gives `apply` its all-or-nothing guarantee without a log.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};

use super::{RowStore, StoreOp};

#[derive(Debug, Clone, Default)]
struct Space {
    /// Fields carrying a unique index, checked per tenant at write time
    unique_fields: BTreeSet<String>,
    /// tenant -> id -> row
    rows: HashMap<String, BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default)]
struct State {
    spaces: HashMap<String, Space>,
}

/// In-memory implementation of [`RowStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowStore for MemoryStore {
    fn space_exists(&self, space: &str) -> bool {
        self.state.read().unwrap().spaces.contains_key(space)
    }

    fn declare_unique(&self, space: &str, field: &str) {
        let mut state = self.state.write().unwrap();
        state
            .spaces
            .entry(space.to_string())
            .or_default()
            .unique_fields
            .insert(field.to_string());
    }

    fn retract_unique(&self, space: &str, field: &str) {
        let mut state = self.state.write().unwrap();
        if let Some(sp) = state.spaces.get_mut(space) {
            sp.unique_fields.remove(field);
        }
    }

    fn get(&self, space: &str, tenant: &str, id: &str) -> Option<Value> {
        let state = self.state.read().unwrap();
        state
            .spaces
            .get(space)
            .and_then(|sp| sp.rows.get(tenant))
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    fn scan(&self, space: &str, tenant: &str) -> Vec<Value> {
        let state = self.state.read().unwrap();
        state
            .spaces
            .get(space)
            .and_then(|sp| sp.rows.get(tenant))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn scan_all(&self, space: &str) -> Vec<(String, Value)> {
        let state = self.state.read().unwrap();
        let Some(sp) = state.spaces.get(space) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut tenants: Vec<_> = sp.rows.keys().collect();
        tenants.sort();
        for tenant in tenants {
            for row in sp.rows[tenant].values() {
                out.push((tenant.clone(), row.clone()));
            }
        }
        out
    }

    fn apply(&self, ops: Vec<StoreOp>) -> EngineResult<()> {
        let mut state = self.state.write().unwrap();
        let mut working = state.clone();

        for op in ops {
            apply_one(&mut working, op)?;
        }

        *state = working;
        Ok(())
    }
}

fn apply_one(state: &mut State, op: StoreOp) -> EngineResult<()> {
    match op {
        StoreOp::Provision { space } => {
            state.spaces.entry(space).or_default();
            Ok(())
        }
        StoreOp::Drop { space } => {
            state.spaces.remove(&space);
            Ok(())
        }
        StoreOp::Insert {
            space,
            tenant,
            id,
            row,
        } => {
            let sp = known_space(state, &space)?;
            if sp.rows.get(&tenant).is_some_and(|rows| rows.contains_key(&id)) {
                return Err(EngineError::conflict(format!(
                    "row '{}' already exists in '{}'",
                    id, space
                )));
            }
            check_unique(sp, &tenant, &id, &row, &space)?;
            sp.rows.entry(tenant).or_default().insert(id, row);
            Ok(())
        }
        StoreOp::Put {
            space,
            tenant,
            id,
            row,
        } => {
            let sp = known_space(state, &space)?;
            check_unique(sp, &tenant, &id, &row, &space)?;
            sp.rows.entry(tenant).or_default().insert(id, row);
            Ok(())
        }
        StoreOp::Remove { space, tenant, id } => {
            let sp = known_space(state, &space)?;
            if let Some(rows) = sp.rows.get_mut(&tenant) {
                rows.remove(&id);
            }
            Ok(())
        }
    }
}

fn known_space<'a>(state: &'a mut State, space: &str) -> EngineResult<&'a mut Space> {
    state
        .spaces
        .get_mut(space)
        .ok_or_else(|| EngineError::not_found(format!("space '{}'", space)))
}

/// Rejects the write if any unique field of the row collides with another
/// row of the same tenant.
fn check_unique(sp: &Space, tenant: &str, id: &str, row: &Value, space: &str) -> EngineResult<()> {
    let Some(rows) = sp.rows.get(tenant) else {
        return Ok(());
    };
    for field in &sp.unique_fields {
        let Some(value) = row.get(field) else { continue };
        if value.is_null() {
            continue;
        }
        let taken = rows
            .iter()
            .any(|(other_id, other)| other_id != id && other.get(field) == Some(value));
        if taken {
            return Err(EngineError::conflict(format!(
                "unique value for '{}' already taken in '{}'",
                field, space
            )));
        }
    }
    Ok(())
}

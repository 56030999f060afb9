//! Structural validation of schema metadata.
//!
//! All checks run before any storage write and fail with a validation
//! error naming the offending attribute, so callers can render a
//! field-level message.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{EngineError, EngineResult};

use super::types::{FieldDefinition, FieldType, RelationshipDefinition, RelationshipType};

/// Field names stamped by the engine itself; user fields may not shadow them.
pub const RESERVED_FIELDS: &[&str] = &[
    "recordId",
    "number",
    "createdAt",
    "createdBy",
    "updatedAt",
    "updatedBy",
    "deleted",
];

fn table_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^u_[a-z0-9_]+$").unwrap())
}

fn field_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap())
}

/// Validates a user table name (`^u_[a-z0-9_]+$`).
pub fn check_table_name(name: &str) -> EngineResult<()> {
    if !table_name_pattern().is_match(name) {
        return Err(EngineError::validation(
            "name",
            format!("'{}' must match ^u_[a-z0-9_]+$", name),
        ));
    }
    Ok(())
}

/// Validates a non-empty label.
pub fn check_label(label: &str) -> EngineResult<()> {
    if label.trim().is_empty() {
        return Err(EngineError::validation("label", "must not be empty"));
    }
    Ok(())
}

/// Validates a field name (`^[a-z][a-z0-9_]*$`, not reserved).
pub fn check_field_name(name: &str) -> EngineResult<()> {
    if !field_name_pattern().is_match(name) {
        return Err(EngineError::validation(
            "fieldName",
            format!("'{}' must match ^[a-z][a-z0-9_]*$", name),
        ));
    }
    if RESERVED_FIELDS.contains(&name) {
        return Err(EngineError::validation(
            "fieldName",
            format!("'{}' is reserved", name),
        ));
    }
    Ok(())
}

/// Validates the type-conditional shape of a field definition:
/// `referenceTable` iff reference type, `choiceOptions` XOR `choiceTable`
/// for choice fields, neither for anything else.
pub fn check_field_shape(field: &FieldDefinition) -> EngineResult<()> {
    check_field_name(&field.field_name)?;
    check_label(&field.label)?;

    match field.field_type {
        FieldType::Reference => {
            if field.reference_table.is_none() {
                return Err(EngineError::validation(
                    "referenceTable",
                    "required for reference fields",
                ));
            }
        }
        _ => {
            if field.reference_table.is_some() {
                return Err(EngineError::validation(
                    "referenceTable",
                    format!("only allowed on reference fields, not {}", field.field_type.type_name()),
                ));
            }
        }
    }

    match field.field_type {
        FieldType::Choice => {
            if field.choice_options.is_some() && field.choice_table.is_some() {
                return Err(EngineError::validation(
                    "choiceOptions",
                    "mutually exclusive with choiceTable",
                ));
            }
            if field.choice_options.is_none() && field.choice_table.is_none() {
                return Err(EngineError::validation(
                    "choiceOptions",
                    "choice fields need choiceOptions or choiceTable",
                ));
            }
            if let Some(options) = &field.choice_options {
                if options.is_empty() {
                    return Err(EngineError::validation("choiceOptions", "must not be empty"));
                }
            }
        }
        _ => {
            if field.choice_options.is_some() || field.choice_table.is_some() {
                return Err(EngineError::validation(
                    "choiceOptions",
                    format!("only allowed on choice fields, not {}", field.field_type.type_name()),
                ));
            }
        }
    }

    Ok(())
}

/// Validates the type-conditional shape of a relationship: `fkColumn` iff
/// ONE_TO_MANY, `m2mTable` iff MANY_TO_MANY, mutually exclusive.
pub fn check_relationship_shape(rel: &RelationshipDefinition) -> EngineResult<()> {
    if rel.name.trim().is_empty() {
        return Err(EngineError::validation("name", "must not be empty"));
    }
    if rel.fk_column.is_some() && rel.m2m_table.is_some() {
        return Err(EngineError::validation(
            "fkColumn",
            "mutually exclusive with m2mTable",
        ));
    }
    match rel.rel_type {
        RelationshipType::OneToMany => {
            if rel.fk_column.is_none() {
                return Err(EngineError::validation(
                    "fkColumn",
                    "required for ONE_TO_MANY relationships",
                ));
            }
        }
        RelationshipType::ManyToMany => {
            if rel.m2m_table.is_none() {
                return Err(EngineError::validation(
                    "m2mTable",
                    "required for MANY_TO_MANY relationships",
                ));
            }
            if rel.fk_column.is_some() {
                return Err(EngineError::validation(
                    "fkColumn",
                    "only allowed on ONE_TO_MANY relationships",
                ));
            }
        }
        RelationshipType::Extends => {
            if rel.fk_column.is_some() || rel.m2m_table.is_some() {
                return Err(EngineError::validation(
                    "fkColumn",
                    "EXTENDS relationships carry neither fkColumn nor m2mTable",
                ));
            }
        }
    }
    Ok(())
}

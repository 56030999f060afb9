//! Schema registry metadata types.
//!
//! Three interdependent entities describe a user-registered schema: the
//! table, its fields, and named relationships between tables. All of them
//! serialize with the wire names the management API uses (camelCase).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Patch semantics for optional attributes: an absent key keeps the
/// current value, an explicit `null` clears it.
fn clearable<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// Data type of a dynamic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text
    #[default]
    Text,
    /// 64-bit float (integers accepted)
    Number,
    /// Boolean
    Boolean,
    /// RFC 3339 date/time
    Date,
    /// One value out of a configured option set
    Choice,
    /// Id of a record in another dynamic table
    Reference,
}

impl FieldType {
    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Choice => "choice",
            FieldType::Reference => "reference",
        }
    }

    /// Comparison class used when building query controls
    pub fn comparison(&self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Text | FieldType::Choice | FieldType::Reference => "string",
        }
    }
}

/// Provisioning state of a table's physical storage.
///
/// Written alongside the metadata row so a crash between metadata and
/// storage provisioning leaves a detectable state instead of a silently
/// half-built table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioning {
    Pending,
    Ready,
    Failed,
}

/// One inline option of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

/// A user-registered entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    /// Immutable identifier, `^u_[a-z0-9_]+$`, unique per tenant
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inactive tables are hidden from listings but keep their data
    pub is_active: bool,
    /// Built-in, protected, non-deletable
    pub is_core: bool,
    /// Optional parent table; single-level inheritance only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Field used as a record's human label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    /// Prefix for generated human-readable record numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_prefix: Option<String>,
    pub provisioning: Provisioning,
}

/// One typed attribute of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Owning table
    pub table_name: String,
    /// Immutable, `^[a-z][a-z0-9_]*$`, unique within the table
    pub field_name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub is_required: bool,
    pub is_unique: bool,
    pub read_only: bool,
    /// Target table; required iff type = reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_table: Option<String>,
    /// Inline option list; mutually exclusive with `choiceTable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_options: Option<Vec<ChoiceOption>>,
    /// External choice source; mutually exclusive with `choiceOptions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Display ordering, >= 0
    pub field_order: u32,
    pub indexed: bool,
    /// Inactive fields are hidden from forms and queries; data is kept
    pub is_active: bool,
}

/// Kind of a relationship between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    #[default]
    OneToMany,
    ManyToMany,
    Extends,
}

/// A named association between two tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDefinition {
    pub name: String,
    pub from_table: String,
    pub to_table: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    /// Required iff type = ONE_TO_MANY; mutually exclusive with `m2mTable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_column: Option<String>,
    /// Join table name; required iff type = MANY_TO_MANY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m2m_table: Option<String>,
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Request body for registering a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateTable {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub display_field: Option<String>,
    #[serde(default)]
    pub number_prefix: Option<String>,
}

/// Request body for updating a table. `name` is immutable. The optional
/// attributes are double-wrapped so `"displayField": null` clears the
/// value while an absent key leaves it untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTable {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "clearable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "clearable")]
    pub display_field: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable")]
    pub number_prefix: Option<Option<String>>,
}

/// Request body for registering a field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateField {
    pub field_name: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub reference_table: Option<String>,
    #[serde(default)]
    pub choice_options: Option<Vec<ChoiceOption>>,
    #[serde(default)]
    pub choice_table: Option<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub field_order: u32,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Request body for updating a field. `fieldName` is immutable; a `type`
/// change is refused once records exist for the table. The optional
/// attributes are double-wrapped so an explicit `null` clears them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateField {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub is_required: Option<bool>,
    #[serde(default)]
    pub is_unique: Option<bool>,
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default, deserialize_with = "clearable")]
    pub reference_table: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable")]
    pub choice_options: Option<Option<Vec<ChoiceOption>>>,
    #[serde(default, deserialize_with = "clearable")]
    pub choice_table: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable")]
    pub default_value: Option<Option<Value>>,
    #[serde(default, deserialize_with = "clearable")]
    pub max_length: Option<Option<usize>>,
    #[serde(default)]
    pub field_order: Option<u32>,
    #[serde(default)]
    pub indexed: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Request body for registering a relationship.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateRelationship {
    pub name: String,
    pub from_table: String,
    pub to_table: String,
    #[serde(rename = "type", default)]
    pub rel_type: RelationshipType,
    #[serde(default)]
    pub fk_column: Option<String>,
    #[serde(default)]
    pub m2m_table: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

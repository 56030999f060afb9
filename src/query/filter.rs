//! # Filter AST
//!
//! A recursive boolean expression: a node is either a single field
//! condition or a group combining child nodes with AND/OR. On the wire a
//! group reads `{logic, conditions[], groups[]}`; internally the children
//! are one explicit sum type so traversal is structural, not by
//! convention. Nesting depth is bounded: anything past
//! [`MAX_FILTER_DEPTH`] is rejected as a validation error instead of
//! risking the stack.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Maximum group nesting a filter may use.
pub const MAX_FILTER_DEPTH: usize = 10;

/// Comparison operators. Field names are case-sensitive; comparison is
/// typed per the field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match
    Equals,
    /// Negated exact match
    NotEquals,
    /// Membership in a list value
    In,
    /// Case-insensitive substring match, strings only
    Contains,
    /// Case-insensitive prefix match, strings only
    StartsWith,
    /// Null, absent, or empty string
    IsEmpty,
    /// Numeric comparison
    Gt,
    Gte,
    Lt,
    Lte,
    /// Date/time comparison
    After,
    Before,
}

/// A single field condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

/// AND/OR combinator of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterLogic {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// One node of the filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Condition(FilterCondition),
    Group(FilterGroup),
}

/// A boolean group of child nodes.
///
/// An empty group matches everything (the identity element for AND).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireGroup", into = "WireGroup")]
pub struct FilterGroup {
    pub logic: FilterLogic,
    pub children: Vec<FilterNode>,
}

/// Wire shape of a group: separate condition and group lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireGroup {
    #[serde(default)]
    logic: FilterLogic,
    #[serde(default)]
    conditions: Vec<FilterCondition>,
    #[serde(default)]
    groups: Vec<WireGroup>,
}

impl From<WireGroup> for FilterGroup {
    fn from(wire: WireGroup) -> Self {
        let mut children: Vec<FilterNode> =
            wire.conditions.into_iter().map(FilterNode::Condition).collect();
        children.extend(
            wire.groups
                .into_iter()
                .map(|g| FilterNode::Group(g.into())),
        );
        Self {
            logic: wire.logic,
            children,
        }
    }
}

impl From<FilterGroup> for WireGroup {
    fn from(group: FilterGroup) -> Self {
        let mut wire = WireGroup {
            logic: group.logic,
            ..Default::default()
        };
        for child in group.children {
            match child {
                FilterNode::Condition(c) => wire.conditions.push(c),
                FilterNode::Group(g) => wire.groups.push(g.into()),
            }
        }
        wire
    }
}

impl FilterGroup {
    /// The empty group: matches every row.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// An AND group over the given conditions.
    pub fn all_of(conditions: Vec<FilterCondition>) -> Self {
        Self {
            logic: FilterLogic::And,
            children: conditions.into_iter().map(FilterNode::Condition).collect(),
        }
    }

    /// An OR group over the given conditions.
    pub fn any_of(conditions: Vec<FilterCondition>) -> Self {
        Self {
            logic: FilterLogic::Or,
            children: conditions.into_iter().map(FilterNode::Condition).collect(),
        }
    }

    /// Parses a group from its JSON text form and bounds its depth.
    pub fn parse(text: &str) -> EngineResult<Self> {
        let group: FilterGroup = serde_json::from_str(text)
            .map_err(|e| EngineError::validation("filter", format!("malformed filter: {}", e)))?;
        group.check_depth()?;
        Ok(group)
    }

    /// Rejects trees nested deeper than [`MAX_FILTER_DEPTH`].
    pub fn check_depth(&self) -> EngineResult<()> {
        if self.depth() > MAX_FILTER_DEPTH {
            return Err(EngineError::validation(
                "filter",
                format!("filter nesting exceeds {} levels", MAX_FILTER_DEPTH),
            ));
        }
        Ok(())
    }

    /// Nesting depth of the tree; a flat group is depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .filter_map(|c| match c {
                FilterNode::Group(g) => Some(g.depth()),
                FilterNode::Condition(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether the group has any conditions left.
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(|c| match c {
            FilterNode::Condition(_) => false,
            FilterNode::Group(g) => g.is_empty(),
        })
    }

    /// Drops every condition whose field `keep` rejects, returning how
    /// many were removed. A dropped condition simply disappears from its
    /// group, which is equivalent to treating it as always-true under AND.
    pub fn prune<F: Fn(&str) -> bool>(&mut self, keep: &F) -> usize {
        let before = self.children.len();
        self.children.retain(|c| match c {
            FilterNode::Condition(cond) => keep(&cond.field),
            FilterNode::Group(_) => true,
        });
        let mut dropped = before - self.children.len();
        for child in &mut self.children {
            if let FilterNode::Group(g) = child {
                dropped += g.prune(keep);
            }
        }
        dropped
    }

    /// Whether a row satisfies this group.
    pub fn matches(&self, row: &Value) -> bool {
        if self.children.is_empty() {
            return true;
        }
        match self.logic {
            FilterLogic::And => self.children.iter().all(|c| c.matches(row)),
            FilterLogic::Or => self.children.iter().any(|c| c.matches(row)),
        }
    }
}

impl FilterNode {
    fn matches(&self, row: &Value) -> bool {
        match self {
            FilterNode::Condition(c) => c.matches(row),
            FilterNode::Group(g) => g.matches(row),
        }
    }
}

impl FilterCondition {
    /// Create a condition.
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Whether a row satisfies this condition.
    pub fn matches(&self, row: &Value) -> bool {
        let field_value = row.get(&self.field);

        if self.operator == FilterOperator::IsEmpty {
            return match field_value {
                None => true,
                Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
        }

        let Some(field_value) = field_value else {
            return false;
        };
        if field_value.is_null() {
            return false;
        }

        match self.operator {
            FilterOperator::Equals => value_eq(field_value, &self.value),
            FilterOperator::NotEquals => !value_eq(field_value, &self.value),
            FilterOperator::In => self
                .value
                .as_array()
                .is_some_and(|list| list.iter().any(|v| value_eq(field_value, v))),
            FilterOperator::Contains => match (field_value.as_str(), self.value.as_str()) {
                (Some(hay), Some(needle)) => {
                    hay.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            FilterOperator::StartsWith => match (field_value.as_str(), self.value.as_str()) {
                (Some(hay), Some(prefix)) => {
                    hay.to_lowercase().starts_with(&prefix.to_lowercase())
                }
                _ => false,
            },
            FilterOperator::Gt => num_cmp(field_value, &self.value).is_some_and(|o| o.is_gt()),
            FilterOperator::Gte => num_cmp(field_value, &self.value).is_some_and(|o| o.is_ge()),
            FilterOperator::Lt => num_cmp(field_value, &self.value).is_some_and(|o| o.is_lt()),
            FilterOperator::Lte => num_cmp(field_value, &self.value).is_some_and(|o| o.is_le()),
            FilterOperator::After => date_cmp(field_value, &self.value).is_some_and(|o| o.is_gt()),
            FilterOperator::Before => date_cmp(field_value, &self.value).is_some_and(|o| o.is_lt()),
            FilterOperator::IsEmpty => unreachable!("handled above"),
        }
    }
}

/// Equality with numeric widening: 1 equals 1.0.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn num_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => None,
    }
}

/// Compares two date/time values. RFC 3339 strings compare as instants;
/// anything else falls back to lexicographic order, which is correct for
/// plain ISO dates.
fn date_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let (a, b) = (a.as_str()?, b.as_str()?);
    match (
        chrono::DateTime::parse_from_rfc3339(a),
        chrono::DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(x), Ok(y)) => Some(x.cmp(&y)),
        _ => Some(a.cmp(b)),
    }
}

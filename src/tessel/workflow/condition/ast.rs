// SPDX-License-Identifier: MIT

//! Condition types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What a condition is evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    #[default]
    Always,
    OutputBased,
    StateBased,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

impl Operator {
    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }
}

/// Predicate deciding whether an edge is active
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EdgeCondition {
    #[serde(rename = "type", default)]
    pub condition_type: ConditionType,
    /// Dot path into the output or the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl EdgeCondition {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn output(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            condition_type: ConditionType::OutputBased,
            field: Some(field.into()),
            operator,
            value: Some(value),
        }
    }

    pub fn state(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            condition_type: ConditionType::StateBased,
            field: Some(field.into()),
            operator,
            value: Some(value),
        }
    }

    pub fn is_always(&self) -> bool {
        self.condition_type == ConditionType::Always
    }

    /// False when no input could ever make the condition hold
    pub fn is_satisfiable(&self) -> bool {
        if self.is_always() {
            return true;
        }
        if self.field.is_none() {
            return false;
        }

        match (&self.operator, &self.value) {
            (Operator::In, Some(Value::Array(items))) => !items.is_empty(),
            (Operator::In | Operator::NotIn, Some(v)) => {
                v.is_array() || v.is_string() || v.is_object()
            }
            (Operator::In | Operator::NotIn, None) => false,
            (op, Some(v)) if op.is_ordering() => v.is_number() || v.is_string(),
            (op, None) if op.is_ordering() => false,
            _ => true,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        };
        f.write_str(s)
    }
}

impl fmt::Display for EdgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.condition_type {
            ConditionType::Always => return f.write_str("always"),
            ConditionType::OutputBased => "output",
            ConditionType::StateBased => "state",
        };
        let value = self.value.as_ref().unwrap_or(&Value::Null);
        write!(
            f,
            "{}.{} {} {}",
            scope,
            self.field.as_deref().unwrap_or("?"),
            self.operator,
            value
        )
    }
}

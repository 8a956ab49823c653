// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sdk::schema::FieldKind;

/// Declared shape of the shared run state
///
/// Keys that are not declared accept any value and use `overwrite`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StateSchema {
    #[serde(flatten)]
    pub fields: BTreeMap<String, StateFieldDef>,
}

/// Definition of a single state key
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    #[serde(rename = "type", default = "any_kind")]
    pub kind: FieldKind,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Value present before any step runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

fn any_kind() -> FieldKind {
    FieldKind::Any
}

/// How a write combines with the current value
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge objects
    Merge,
}

impl StateSchema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn with_field(mut self, key: impl Into<String>, reducer: ReducerType) -> Self {
        self.fields.insert(
            key.into(),
            StateFieldDef {
                kind: FieldKind::Any,
                reducer,
                default: None,
            },
        );
        self
    }
}

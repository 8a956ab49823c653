// SPDX-License-Identifier: MIT

//! Structural step schemas
//!
//! A `Schema` is a map of field name to primitive kind. Two schemas are
//! compatible when their shapes are equal, which lets steps built from
//! configuration be compared with steps defined in Rust. On the wire a
//! schema is a small JSON-Schema subset:
//!
//! ```json
//! {"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Primitive kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Accepts any JSON value
    Any,
}

impl FieldKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// Check whether a JSON value is of this kind
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Declaration of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
}

/// Structural schema of a step's input or output
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "SchemaDescriptor", into = "SchemaDescriptor")]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    /// An open schema with no declared fields; accepts any value
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: true,
            },
        );
        self
    }

    /// Add an optional field
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: false,
            },
        );
        self
    }

    /// Derive a schema from a Rust type
    pub fn of<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        match serde_json::to_value(&root) {
            Ok(value) => Self::from_json_schema(&value),
            Err(e) => {
                log::warn!("Failed to render JSON schema: {}", e);
                Self::default()
            }
        }
    }

    /// Read the top-level properties of a full JSON Schema document
    pub fn from_json_schema(value: &Value) -> Self {
        let required: Vec<&str> = value
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = value
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| {
                        let spec = FieldSpec {
                            kind: kind_of_property(prop),
                            required: required.contains(&name.as_str()),
                        };
                        (name.clone(), spec)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fields }
    }

    /// True when no field is declared
    pub fn is_open(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldSpec> {
        &self.fields
    }

    /// Whether values shaped by `self` can feed a step expecting `downstream`
    pub fn is_compatible_with(&self, downstream: &Schema) -> bool {
        downstream.is_open() || self == downstream
    }

    /// Whether every field of `self` is declared in `other` with the same kind
    pub fn is_subset_of(&self, other: &Schema) -> bool {
        self.fields.iter().all(|(name, spec)| {
            other
                .fields
                .get(name)
                .is_some_and(|o| o.kind == spec.kind || o.kind == FieldKind::Any)
        })
    }

    /// Check a value against the schema, collecting every violation
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if self.is_open() {
            return Ok(());
        }

        let Some(obj) = value.as_object() else {
            return Err(format!("expected an object, got {}", type_name(value)));
        };

        let mut problems = Vec::new();
        for (name, spec) in &self.fields {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        problems.push(format!("missing required field '{}'", name));
                    }
                }
                Some(v) if !spec.kind.matches(v) => problems.push(format!(
                    "field '{}' expected {:?}, got {}",
                    name,
                    spec.kind,
                    type_name(v)
                )),
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    /// Validate a value and drop the fields the schema does not declare
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        self.validate(&value)?;
        if self.is_open() {
            return Ok(value);
        }

        match value {
            Value::Object(obj) => Ok(Value::Object(
                obj.into_iter()
                    .filter(|(k, _)| self.fields.contains_key(k))
                    .collect(),
            )),
            other => Ok(other),
        }
    }
}

fn kind_of_property(prop: &Value) -> FieldKind {
    match prop.get("type") {
        Some(Value::String(t)) => FieldKind::from_type_name(t).unwrap_or(FieldKind::Any),
        // `Option<T>` renders as ["T", "null"]
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .find_map(FieldKind::from_type_name)
            .unwrap_or(FieldKind::Any),
        _ if prop.get("$ref").is_some() || prop.get("allOf").is_some() => FieldKind::Object,
        _ => FieldKind::Any,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wire form of a schema
#[derive(Debug, Clone, Deserialize, Serialize)]
struct SchemaDescriptor {
    #[serde(rename = "type", default = "object_type")]
    schema_type: String,
    #[serde(default)]
    properties: BTreeMap<String, PropertyDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PropertyDescriptor {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<FieldKind>,
}

fn object_type() -> String {
    "object".to_string()
}

impl TryFrom<SchemaDescriptor> for Schema {
    type Error = String;

    fn try_from(desc: SchemaDescriptor) -> Result<Self, Self::Error> {
        if desc.schema_type != "object" {
            return Err(format!(
                "step schemas must have type 'object', got '{}'",
                desc.schema_type
            ));
        }
        if let Some(unknown) = desc
            .required
            .iter()
            .find(|r| !desc.properties.contains_key(*r))
        {
            return Err(format!("required field '{}' is not declared", unknown));
        }

        let fields = desc
            .properties
            .into_iter()
            .map(|(name, prop)| {
                let spec = FieldSpec {
                    kind: prop.kind.unwrap_or(FieldKind::Any),
                    required: desc.required.contains(&name),
                };
                (name, spec)
            })
            .collect();
        Ok(Self { fields })
    }
}

impl From<Schema> for SchemaDescriptor {
    fn from(schema: Schema) -> Self {
        let required = schema
            .fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.clone())
            .collect();
        let properties = schema
            .fields
            .into_iter()
            .map(|(name, spec)| {
                let kind = (spec.kind != FieldKind::Any).then_some(spec.kind);
                (name, PropertyDescriptor { kind })
            })
            .collect();
        Self {
            schema_type: object_type(),
            properties,
            required,
        }
    }
}

/// Shallow-merge object values, later keys win
pub fn merge_objects<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut merged = Map::new();
    for value in values {
        if let Value::Object(obj) = value {
            for (k, v) in obj {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(merged)
}

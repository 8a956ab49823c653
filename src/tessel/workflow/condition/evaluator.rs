// SPDX-License-Identifier: MIT

//! Condition evaluator

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::ast::{ConditionType, EdgeCondition, Operator};
use crate::tessel::workflow::state::lookup_path;

/// Evaluate a condition against the source step's output and the shared state
pub fn evaluate(condition: &EdgeCondition, output: &Value, state: &Map<String, Value>) -> bool {
    let Some(field) = condition.field.as_deref() else {
        return condition.is_always();
    };

    let actual = match condition.condition_type {
        ConditionType::Always => return true,
        ConditionType::OutputBased => output.as_object().and_then(|o| lookup_path(o, field)),
        ConditionType::StateBased => lookup_path(state, field),
    };

    compare(actual, condition.operator, condition.value.as_ref())
}

fn compare(actual: Option<&Value>, op: Operator, expected: Option<&Value>) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    let expected = expected.unwrap_or(&Value::Null);

    match op {
        Operator::Eq => values_equal(actual, expected),
        Operator::NotEq => !values_equal(actual, expected),
        Operator::Gt => order(actual, expected) == Some(Ordering::Greater),
        Operator::Lt => order(actual, expected) == Some(Ordering::Less),
        Operator::Gte => matches!(
            order(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lte => matches!(
            order(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => contains(expected, actual).unwrap_or(false),
        Operator::NotIn => contains(expected, actual).map(|c| !c).unwrap_or(false),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Numbers compare numerically, strings lexicographically, anything else is incomparable
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Membership test; `None` when the container is not a collection
fn contains(container: &Value, item: &Value) -> Option<bool> {
    match container {
        Value::Array(items) => Some(items.iter().any(|v| values_equal(v, item))),
        Value::String(s) => Some(item.as_str().is_some_and(|needle| s.contains(needle))),
        Value::Object(obj) => Some(item.as_str().is_some_and(|k| obj.contains_key(k))),
        _ => None,
    }
}

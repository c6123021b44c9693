//! Condition evaluation over JSON values.
//!
//! Used by the bundled in-memory transport to honor `(field, op, value)`
//! filter triples. A real remote transport evaluates conditions server-side;
//! the semantics here are the reference for what that evaluation must mean.

use std::cmp::Ordering;

use serde_json::Value;

use crate::types::{Condition, FilterOp};

// ============================================================================
// Value comparison
// ============================================================================

/// Compare two JSON values for ordering.
///
/// - Both numbers → f64 comparison (NaN treated as Equal)
/// - Both strings → lexicographic (codepoint order)
/// - Both booleans → false < true
/// - Cross-type or non-scalar → type rank: number(0), string(1), bool(2), other(3)
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(f64::NAN);
            let fb = nb.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

// ============================================================================
// Field path resolution
// ============================================================================

/// Get a nested value from a document using a dot-separated path.
/// Returns `None` if any segment is missing or a parent is not an object.
pub fn get_field_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// ============================================================================
// Condition evaluation
// ============================================================================

/// Evaluate a single condition against a document.
///
/// A document without the condition's field matches nothing — not even `Ne`.
pub fn matches_condition(doc: &Value, cond: &Condition) -> bool {
    let value = match get_field_value(doc, &cond.field) {
        Some(v) => v,
        None => return false,
    };

    match cond.op {
        FilterOp::Eq => value == &cond.value,
        FilterOp::Ne => value != &cond.value,
        FilterOp::Lt => ordered(value, &cond.value, |o| o == Ordering::Less),
        FilterOp::Le => ordered(value, &cond.value, |o| o != Ordering::Greater),
        FilterOp::Gt => ordered(value, &cond.value, |o| o == Ordering::Greater),
        FilterOp::Ge => ordered(value, &cond.value, |o| o != Ordering::Less),
        FilterOp::In => cond
            .value
            .as_array()
            .is_some_and(|items| items.iter().any(|item| item == value)),
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|arr| arr.iter().any(|v| v == &cond.value)),
    }
}

/// Ordering comparisons never match null operands or null field values.
fn ordered(value: &Value, operand: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    if value.is_null() || operand.is_null() {
        return false;
    }
    pred(compare_values(value, operand))
}

/// Evaluate a conjunction of conditions in caller-given order.
pub fn matches_all(doc: &Value, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| matches_condition(doc, c))
}

// ============================================================================
// Tests
// ============================================================================

//! Evaluates `x-migration-when` predicates against the root `{old, new}` pair.

use serde_json::Value;

use crate::path::Segment;

/// Operators tried in this fixed order so `>=`/`<=` are recognized before
/// the shorter `>`/`<` would otherwise match first.
const OPERATORS: &[&str] = &["==", "!=", ">=", "<=", ">", "<"];

/// Evaluate `condition` (e.g. `$.old.tier=='gold'`) against `root`, which
/// must be a JSON object shaped `{"old": ..., "new": ...}`. An empty
/// condition, or one with no recognized operator, is vacuously true. A path
/// that resolves to nothing is false.
pub fn evaluate(root: &Value, condition: &str) -> bool {
    if condition.trim().is_empty() {
        return true;
    }

    let Some((op, path_part, literal_part)) = split_on_operator(condition) else {
        return true;
    };

    let expected = parse_literal(literal_part.trim());
    let actual = match lookup(root, path_part.trim()) {
        Some(value) => value,
        None => return false,
    };

    compare(&actual, op, &expected)
}

fn split_on_operator(condition: &str) -> Option<(&'static str, &str, &str)> {
    for op in OPERATORS {
        if let Some(idx) = condition.find(op) {
            let (path_part, rest) = condition.split_at(idx);
            let literal_part = &rest[op.len()..];
            return Some((op, path_part, literal_part));
        }
    }
    None
}

fn parse_literal(raw: &str) -> Value {
    if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
    {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if raw.contains('.') {
        if let Ok(f) = raw.parse::<f64>() {
            return serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
    } else if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    Value::String(raw.to_string())
}

fn lookup(root: &Value, path: &str) -> Option<Value> {
    let segments = crate::path::parse_segments(path);
    let mut node = root;
    for segment in &segments {
        node = match (node, segment) {
            (Value::Object(map), Segment::Key(name)) => map.get(name)?,
            (Value::Array(items), Segment::Index(i)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(node.clone())
}

fn compare(actual: &Value, op: &str, expected: &Value) -> bool {
    match op {
        "==" => values_equal(actual, expected),
        "!=" => !values_equal(actual, expected),
        ">" | "<" | ">=" | "<=" => match (as_f64(actual), as_f64(expected)) {
            (Some(a), Some(b)) => match op {
                ">" => a > b,
                "<" => a < b,
                ">=" => a >= b,
                "<=" => a <= b,
                _ => unreachable!(),
            },
            _ => false,
        },
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

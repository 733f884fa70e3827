use serde_json::Value;

use braid_core::traits::ConditionEvaluator;
use braid_core::types::Variables;

/// Default guard evaluator for exclusive gateways.
///
/// Supported expressions:
/// - `key == "value"`, `key != "value"`: string match
/// - `key == 3`, `key != true`: number / boolean match
/// - `key > 3`, `key >= 3`, `key < 3`, `key <= 3`: numeric comparison
/// - `key contains "substr"`: substring match
/// - `true`, `false`: literals
/// - `key`, `!key`: truthiness of a variable
///
/// Returns `false` for unparseable expressions and missing keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEvaluator;

impl ConditionEvaluator for ExpressionEvaluator {
    fn evaluate(&self, expression: &str, variables: &Variables) -> bool {
        evaluate_condition(expression, variables)
    }
}

/// Evaluate a simple conditional expression against process variables.
pub fn evaluate_condition(expr: &str, variables: &Variables) -> bool {
    let expr = expr.trim();

    match expr {
        "true" => return true,
        "false" | "" => return false,
        _ => {}
    }

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, " contains ") {
        return variables
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.contains(unquote(substr)));
    }

    if let Some((key, rhs)) = parse_operator(expr, "!=") {
        return variables.get(key).is_some_and(|v| !equals(v, rhs));
    }

    if let Some((key, rhs)) = parse_operator(expr, "==") {
        return variables.get(key).is_some_and(|v| equals(v, rhs));
    }

    for (op, cmp) in [
        (">=", f64::ge as fn(&f64, &f64) -> bool),
        ("<=", f64::le),
        (">", f64::gt),
        ("<", f64::lt),
    ] {
        if let Some((key, rhs)) = parse_operator(expr, op) {
            return match (variables.get(key).and_then(as_number), rhs.parse::<f64>()) {
                (Some(lhs), Ok(rhs)) => cmp(&lhs, &rhs),
                _ => false,
            };
        }
    }

    if let Some(key) = expr.strip_prefix('!') {
        return is_identifier(key) && !variables.get(key).is_some_and(truthy);
    }

    is_identifier(expr) && variables.get(expr).is_some_and(truthy)
}

/// Parse `key OP value` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let parts: Vec<&str> = expr.splitn(2, op).collect();
    if parts.len() != 2 {
        return None;
    }
    let key = parts[0].trim();
    if !is_identifier(key) {
        return None;
    }
    Some((key, parts[1].trim()))
}

fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

fn equals(value: &Value, rhs: &str) -> bool {
    if rhs.starts_with('"') {
        return value.as_str() == Some(unquote(rhs));
    }
    match rhs {
        "true" => return value.as_bool() == Some(true),
        "false" => return value.as_bool() == Some(false),
        "null" => return value.is_null(),
        _ => {}
    }
    match rhs.parse::<f64>() {
        Ok(n) => as_number(value) == Some(n),
        Err(_) => value.as_str() == Some(rhs),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

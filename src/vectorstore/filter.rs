//! Metadata filter semantics (spec §4.C): dotted paths into `metadata`,
//! scalar/array/operator leaf matching.

use serde_json::Value;
use std::collections::HashMap;

/// Returns true if `metadata` satisfies every key/value pair in `filter`.
/// A chunk with empty metadata never matches a non-empty filter.
pub fn matches_filter(metadata: &HashMap<String, Value>, filter: &Value) -> bool {
    let Some(filter_obj) = filter.as_object() else {
        return true;
    };
    if filter_obj.is_empty() {
        return true;
    }
    if metadata.is_empty() {
        return false;
    }

    filter_obj.iter().all(|(path, expected)| {
        match resolve_path(metadata, path) {
            Some(candidate) => leaf_matches(candidate, expected),
            None => false,
        }
    })
}

fn resolve_path<'a>(metadata: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = metadata.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

const OPERATORS: [&str; 5] = ["$gt", "$gte", "$lt", "$lte", "$ne"];

fn is_operator_object(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => !map.is_empty() && map.keys().all(|k| OPERATORS.contains(&k.as_str())),
        None => false,
    }
}

fn leaf_matches(candidate: &Value, expected: &Value) -> bool {
    if is_operator_object(expected) {
        let ops = expected.as_object().unwrap();
        return ops.iter().all(|(op, operand)| match op.as_str() {
            "$ne" => candidate != operand,
            "$gt" => compare_numeric(candidate, operand, |a, b| a > b),
            "$gte" => compare_numeric(candidate, operand, |a, b| a >= b),
            "$lt" => compare_numeric(candidate, operand, |a, b| a < b),
            "$lte" => compare_numeric(candidate, operand, |a, b| a <= b),
            _ => false,
        });
    }

    if let Some(expected_array) = expected.as_array() {
        return if let Some(candidate_array) = candidate.as_array() {
            candidate_array.iter().any(|c| expected_array.contains(c))
        } else {
            expected_array.contains(candidate)
        };
    }

    candidate == expected
}

fn compare_numeric(candidate: &Value, operand: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (candidate.as_f64(), operand.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn scalar_equality() {
        let m = meta(&[("category", json!("legal"))]);
        assert!(matches_filter(&m, &json!({"category": "legal"})));
        assert!(!matches_filter(&m, &json!({"category": "finance"})));
    }

    #[test]
    fn nested_dotted_path() {
        let m = meta(&[("source", json!({"kind": "pdf", "pages": 12}))]);
        assert!(matches_filter(&m, &json!({"source.kind": "pdf"})));
        assert!(!matches_filter(&m, &json!({"source.kind": "html"})));
    }

    #[test]
    fn array_membership_and_overlap() {
        let m = meta(&[("tag", json!("a"))]);
        assert!(matches_filter(&m, &json!({"tag": ["a", "b"]})));

        let m2 = meta(&[("tags", json!(["a", "c"]))]);
        assert!(matches_filter(&m2, &json!({"tags": ["a", "b"]})));
        assert!(!matches_filter(&m2, &json!({"tags": ["x", "y"]})));
    }

    #[test]
    fn operator_object_requires_all_operators() {
        let m = meta(&[("score", json!(5))]);
        assert!(matches_filter(&m, &json!({"score": {"$gt": 1, "$lte": 10}})));
        assert!(!matches_filter(&m, &json!({"score": {"$gt": 1, "$lte": 3}})));
    }

    #[test]
    fn empty_metadata_never_matches_nonempty_filter() {
        let m: HashMap<String, Value> = HashMap::new();
        assert!(!matches_filter(&m, &json!({"category": "legal"})));
        assert!(matches_filter(&m, &json!({})));
    }

    #[test]
    fn missing_path_does_not_match() {
        let m = meta(&[("category", json!("legal"))]);
        assert!(!matches_filter(&m, &json!({"other": "x"})));
    }
}

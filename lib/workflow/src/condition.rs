//! Condition evaluation.
//!
//! Every comparison yields a boolean. Malformed input routes to `false`
//! (and therefore the `no` branch) instead of failing the run.

use crate::node::ConditionNode;
use crate::template::{TemplateContext, has_placeholder, stringify};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison operator of a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
    /// Any operator name this engine does not know. Always false.
    #[serde(other)]
    Unknown,
}

/// Compares two already-resolved strings.
#[must_use]
pub fn evaluate(left: &str, operator: Operator, right: &str) -> bool {
    match operator {
        Operator::Equals => left == right,
        Operator::Contains => left.contains(right),
        Operator::GreaterThan => compare_numbers(left, right, |l, r| l > r),
        Operator::LessThan => compare_numbers(left, right, |l, r| l < r),
        Operator::IsEmpty => left.is_empty(),
        Operator::IsNotEmpty => !left.is_empty(),
        Operator::Unknown => false,
    }
}

fn compare_numbers(left: &str, right: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => cmp(l, r),
        _ => false,
    }
}

/// Resolves both sides of a condition node and evaluates it.
///
/// A `field` containing a placeholder is resolved as a template; otherwise it
/// is looked up as a bare path. The comparison `value` is always resolved as
/// a template.
#[must_use]
pub fn evaluate_node(node: &ConditionNode, ctx: &TemplateContext<'_>) -> bool {
    let left = if has_placeholder(&node.field) {
        ctx.resolve(&node.field)
    } else {
        ctx.lookup_field(&node.field)
            .map(stringify)
            .unwrap_or_default()
    };
    let right = match &node.value {
        JsonValue::String(s) => ctx.resolve(s),
        other => stringify(other),
    };
    evaluate(&left, node.operator, &right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn equals_is_case_sensitive() {
        assert!(evaluate("Qualified", Operator::Equals, "Qualified"));
        assert!(!evaluate("qualified", Operator::Equals, "Qualified"));
    }

    #[test]
    fn contains_tests_left_for_right() {
        assert!(evaluate("enterprise plan", Operator::Contains, "enterprise"));
        assert!(!evaluate("enterprise", Operator::Contains, "enterprise plan"));
        assert!(evaluate("anything", Operator::Contains, ""));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(evaluate("100", Operator::GreaterThan, "99.5"));
        assert!(evaluate(" 3 ", Operator::LessThan, "4"));
        assert!(!evaluate("10", Operator::LessThan, "9"));
        assert!(!evaluate("5", Operator::GreaterThan, "5"));
    }

    #[test]
    fn non_numeric_comparisons_are_false() {
        for (left, right) in [("abc", "1"), ("1", "abc"), ("", ""), ("1,000", "5")] {
            assert!(!evaluate(left, Operator::GreaterThan, right));
            assert!(!evaluate(left, Operator::LessThan, right));
        }
    }

    #[test]
    fn emptiness_ignores_right_side() {
        assert!(evaluate("", Operator::IsEmpty, "ignored"));
        assert!(!evaluate(" ", Operator::IsEmpty, ""));
        assert!(evaluate("x", Operator::IsNotEmpty, ""));
        assert!(!evaluate("", Operator::IsNotEmpty, "x"));
    }

    #[test]
    fn unknown_operator_deserializes_and_is_false() {
        let op: Operator = serde_json::from_value(json!("starts_with")).expect("deserialize");
        assert_eq!(op, Operator::Unknown);
        assert!(!evaluate("a", op, "a"));

        let op: Operator = serde_json::from_value(json!("greater_than")).expect("deserialize");
        assert_eq!(op, Operator::GreaterThan);
    }

    #[test]
    fn node_resolves_bare_field_and_templated_value() {
        let mut outputs = BTreeMap::new();
        outputs.insert(NodeId::from("ai"), json!({"result": "hot"}));
        let trigger = json!({"x": "1", "employees": 40, "threshold": "25"});
        let ctx = TemplateContext::new(&trigger, &outputs);

        let node = |field: &str, operator, value| ConditionNode {
            field: field.to_string(),
            operator,
            value,
        };

        assert!(evaluate_node(&node("x", Operator::Equals, json!("1")), &ctx));
        assert!(evaluate_node(&node("x", Operator::Equals, json!(1)), &ctx));
        assert!(evaluate_node(
            &node("employees", Operator::GreaterThan, json!("{{trigger.threshold}}")),
            &ctx
        ));
        assert!(evaluate_node(&node("ai.result", Operator::Equals, json!("hot")), &ctx));
        assert!(evaluate_node(
            &node("{{ai.output.result}}", Operator::Contains, json!("ho")),
            &ctx
        ));
        assert!(evaluate_node(&node("missing", Operator::IsEmpty, JsonValue::Null), &ctx));
    }
}

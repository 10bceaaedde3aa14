use std::cmp::Ordering;

use qs_core::{QsValue, ScriptQueueError};

pub const DISPATCH_INVALID_CONDITION: &str = "DISPATCH_INVALID_CONDITION";

const COMPARISONS: &[&str] = &["==", "!=", "<", ">", "<=", ">="];

fn operator(value: &QsValue) -> Option<&str> {
    value.as_string().map(str::trim)
}

fn is_word(value: &QsValue, word: &str) -> bool {
    operator(value) == Some(word)
}

/// Evaluates a guard made of resolved values: `||` groups of `&&` groups
/// of either one value (truthiness, `!` negates) or `left <op> right`.
pub fn evaluate_condition(values: &[QsValue]) -> Result<bool, ScriptQueueError> {
    if values.is_empty() {
        return Err(invalid("Empty condition."));
    }
    for any in values.split(|value| is_word(value, "||")) {
        let mut all = true;
        for clause in any.split(|value| is_word(value, "&&")) {
            if !evaluate_clause(clause)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

fn evaluate_clause(clause: &[QsValue]) -> Result<bool, ScriptQueueError> {
    match clause {
        [single] => Ok(truthy(single)),
        [left, op, right] => match operator(op) {
            Some(op) if COMPARISONS.contains(&op) => compare(left, op, right),
            _ => Err(invalid(format!("Unknown comparison \"{}\".", op))),
        },
        [] => Err(invalid("Empty clause around a logical operator.")),
        _ => Err(invalid(format!(
            "Cannot evaluate {} values without an operator between each pair.",
            clause.len()
        ))),
    }
}

fn truthy(value: &QsValue) -> bool {
    if let Some(text) = value.as_string() {
        if let Some(rest) = text.trim().strip_prefix('!') {
            return !QsValue::from(rest).is_truthy();
        }
    }
    value.is_truthy()
}

fn compare(left: &QsValue, op: &str, right: &QsValue) -> Result<bool, ScriptQueueError> {
    let numbers = left.as_number().zip(right.as_number());
    match op {
        "==" | "!=" => {
            let equal = match numbers {
                Some((left, right)) => left == right,
                None => left.to_string().eq_ignore_ascii_case(&right.to_string()),
            };
            Ok(equal == (op == "=="))
        }
        _ => {
            let (left, right) = numbers.ok_or_else(|| {
                invalid(format!(
                    "\"{} {} {}\" needs two numbers.",
                    left, op, right
                ))
            })?;
            let ordering = left
                .partial_cmp(&right)
                .ok_or_else(|| invalid("Cannot order NaN."))?;
            Ok(match op {
                "<" => ordering == Ordering::Less,
                ">" => ordering == Ordering::Greater,
                "<=" => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn invalid(message: impl Into<String>) -> ScriptQueueError {
    ScriptQueueError::new(DISPATCH_INVALID_CONDITION, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<QsValue> {
        items.iter().map(|item| QsValue::from(*item)).collect()
    }

    #[test]
    fn single_values_use_truthiness_and_negation() {
        assert!(evaluate_condition(&[QsValue::Bool(true)]).expect("bool"));
        assert!(!evaluate_condition(&values(&["false"])).expect("text"));
        assert!(evaluate_condition(&values(&["!false"])).expect("negated"));
        assert!(!evaluate_condition(&values(&["!yes"])).expect("negated"));
        assert!(!evaluate_condition(&[QsValue::Number(0.0)]).expect("zero"));
    }

    #[test]
    fn comparisons_prefer_numbers_then_text() {
        assert!(evaluate_condition(&values(&["3", "==", "3.0"])).expect("eq"));
        assert!(evaluate_condition(&values(&["Ada", "==", "ada"])).expect("text eq"));
        assert!(evaluate_condition(&values(&["a", "!=", "b"])).expect("ne"));
        assert!(evaluate_condition(&[QsValue::Number(2.0), QsValue::from("<"), QsValue::from("10")])
            .expect("lt"));
        assert!(evaluate_condition(&values(&["5", ">=", "5"])).expect("ge"));
        assert!(!evaluate_condition(&values(&["5", "<", "5"])).expect("lt"));
    }

    #[test]
    fn logical_operators_group_left_to_right() {
        assert!(evaluate_condition(&values(&["false", "||", "1", "==", "1"])).expect("or"));
        assert!(!evaluate_condition(&values(&["true", "&&", "1", "==", "2"])).expect("and"));
        assert!(
            evaluate_condition(&values(&["false", "&&", "true", "||", "true"])).expect("mixed")
        );
    }

    #[test]
    fn malformed_conditions_are_errors() {
        for bad in [
            values(&[]),
            values(&["a", "b"]),
            values(&["a", "~", "b"]),
            values(&["a", "<", "b"]),
            values(&["true", "&&"]),
        ] {
            let error = evaluate_condition(&bad).expect_err("malformed");
            assert_eq!(error.code, DISPATCH_INVALID_CONDITION);
        }
    }
}

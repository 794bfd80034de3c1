//! Branch steps: conditions evaluated against the contact snapshot

use serde_json::json;

use super::StepAction;
use crate::model::{BranchConfig, BranchOperator, Contact};

/// Evaluate a branch condition
///
/// A field the contact does not have never passes. Numeric operators parse
/// both sides as numbers and fail on anything non-numeric.
pub fn evaluate(config: &BranchConfig, contact: &Contact) -> bool {
    let Some(actual) = contact.field_value(&config.field) else {
        return false;
    };

    match config.operator {
        BranchOperator::Equals => actual == config.value,
        BranchOperator::Contains => actual.contains(config.value.as_str()),
        BranchOperator::GreaterThan => {
            compare_numeric(&actual, &config.value).is_some_and(|(a, b)| a > b)
        }
        BranchOperator::LessThan => {
            compare_numeric(&actual, &config.value).is_some_and(|(a, b)| a < b)
        }
    }
}

fn compare_numeric(actual: &str, expected: &str) -> Option<(f64, f64)> {
    let actual = actual.trim().parse::<f64>().ok()?;
    let expected = expected.trim().parse::<f64>().ok()?;
    Some((actual, expected))
}

pub(super) fn execute(config: &BranchConfig, contact: &Contact) -> StepAction {
    if evaluate(config, contact) {
        StepAction::Continue(json!({ "passed": true }))
    } else {
        StepAction::Halt
    }
}

//! Delay steps and the wait-duration parser

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use super::StepAction;
use crate::model::DelayConfig;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

/// Parse a free-text wait such as "2 Hours" into minutes
///
/// The leading integer is the amount (1 when missing). The unit is found by
/// a case-insensitive search for "minute", "hour", "day" and "week", in that
/// order. Anything else counts as days. Amounts too large for `i64`
/// saturate.
pub fn parse_wait_minutes(duration: &str) -> i64 {
    let trimmed = duration.trim_start();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    let amount = if digits.is_empty() {
        1
    } else {
        // Only digits remain, so parsing fails on overflow alone
        digits.parse::<i64>().unwrap_or(i64::MAX)
    };

    let lower = trimmed.to_ascii_lowercase();
    let unit = if lower.contains("minute") {
        1
    } else if lower.contains("hour") {
        MINUTES_PER_HOUR
    } else if lower.contains("day") {
        MINUTES_PER_DAY
    } else if lower.contains("week") {
        MINUTES_PER_WEEK
    } else {
        MINUTES_PER_DAY
    };

    amount.saturating_mul(unit)
}

pub(super) fn execute(config: &DelayConfig, now: DateTime<Utc>) -> StepAction {
    let wait_minutes = parse_wait_minutes(&config.duration);

    // Waits past the representable range resume at the end of time
    let resume_at = Duration::try_minutes(wait_minutes)
        .and_then(|wait| now.checked_add_signed(wait))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    StepAction::Suspend {
        output: json!({ "waitMinutes": wait_minutes, "resumeAt": resume_at }),
        resume_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_table() {
        let cases = [
            ("5 Minutes", 5),
            ("2 Hours", 120),
            ("3 Days", 4320),
            ("1 Week", 10080),
            ("Immediately", 1440),
            ("3 Foo", 4320),
            ("99999999999999999999 minutes", i64::MAX),
            ("99999999999999999999 weeks", i64::MAX),
            ("1000000000000 weeks", 10_080_000_000_000_000),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_wait_minutes(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_unit_search_is_case_insensitive_and_ordered() {
        assert_eq!(parse_wait_minutes("10 MINUTES"), 10);
        assert_eq!(parse_wait_minutes("1 hour"), 60);
        // "minute" is checked before "day"
        assert_eq!(parse_wait_minutes("30 minutes a day"), 30);
    }

    #[test]
    fn test_missing_amount_defaults_to_one() {
        assert_eq!(parse_wait_minutes("Hours"), 60);
        assert_eq!(parse_wait_minutes(""), 1440);
    }

    #[test]
    fn test_execute_suspends_until_now_plus_wait() {
        let now = Utc::now();
        let action = execute(
            &DelayConfig {
                duration: "2 Hours".to_string(),
            },
            now,
        );

        match action {
            StepAction::Suspend { output, resume_at } => {
                assert_eq!(resume_at, now + Duration::minutes(120));
                assert_eq!(output["waitMinutes"], 120);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_execute_oversized_wait_resumes_at_max() {
        let now = Utc::now();

        for duration in ["1000000000000 weeks", "99999999999999999999 minutes"] {
            let action = execute(
                &DelayConfig {
                    duration: duration.to_string(),
                },
                now,
            );

            match action {
                StepAction::Suspend { resume_at, .. } => {
                    assert_eq!(resume_at, DateTime::<Utc>::MAX_UTC, "duration: {}", duration)
                }
                other => panic!("unexpected action: {:?}", other),
            }
        }
    }
}

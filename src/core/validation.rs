// src/core/validation.rs

use crate::models::{OptionDefinition, OptionType};
use chrono::TimeDelta;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref DURATION_RE: Regex =
        Regex::new(r"^[-+]?(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
            .expect("duration expression must compile");
    static ref DURATION_PART_RE: Regex =
        Regex::new(r"(\d*)(?:\.(\d*))?(ns|us|µs|μs|ms|s|m|h)")
            .expect("duration part expression must compile");
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid value for option '{option}': {message}")]
    Custom { option: String, message: String },
    #[error("invalid value '{value}' for option '{option}', has to match the following regEx: {pattern}")]
    PatternMismatch {
        option: String,
        value: String,
        pattern: String,
    },
    #[error("invalid validation pattern '{pattern}' of option '{option}': {source}")]
    InvalidPattern {
        option: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid value '{value}' for option '{option}', has to match one of the following values: {allowed:?}")]
    NotInEnum {
        option: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("invalid value '{value}' for option '{option}', must be a {kind}")]
    WrongType {
        option: String,
        value: String,
        kind: &'static str,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid duration '{0}'")]
pub struct DurationError(pub String);

/// Checks `value` against the pattern, the closed value set and the declared
/// type of `definition`.
pub fn validate_value(
    option: &str,
    value: &str,
    definition: &OptionDefinition,
) -> Result<(), ValidationError> {
    if !definition.validation_pattern.is_empty() {
        let matcher = Regex::new(&definition.validation_pattern).map_err(|source| {
            ValidationError::InvalidPattern {
                option: option.to_string(),
                pattern: definition.validation_pattern.clone(),
                source,
            }
        })?;
        if !matcher.is_match(value) {
            if !definition.validation_message.is_empty() {
                return Err(ValidationError::Custom {
                    option: option.to_string(),
                    message: definition.validation_message.clone(),
                });
            }
            return Err(ValidationError::PatternMismatch {
                option: option.to_string(),
                value: value.to_string(),
                pattern: definition.validation_pattern.clone(),
            });
        }
    }

    if !definition.enum_values.is_empty() && !definition.enum_values.iter().any(|v| v == value)
    {
        return Err(ValidationError::NotInEnum {
            option: option.to_string(),
            value: value.to_string(),
            allowed: definition.enum_values.clone(),
        });
    }

    let type_ok = match definition.value_type {
        None | Some(OptionType::String) => true,
        Some(OptionType::Number) => value.parse::<i64>().is_ok(),
        Some(OptionType::Boolean) => parse_bool(value).is_some(),
        Some(OptionType::Duration) => parse_duration(value).is_ok(),
    };
    if !type_ok {
        let kind = match definition.value_type {
            Some(OptionType::Number) => "number",
            Some(OptionType::Boolean) => "boolean",
            _ => "duration",
        };
        return Err(ValidationError::WrongType {
            option: option.to_string(),
            value: value.to_string(),
            kind,
        });
    }

    Ok(())
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Parses a Go-style duration such as `300ms`, `10m`, `1h30m` or `1.5h`.
pub fn parse_duration(input: &str) -> Result<TimeDelta, DurationError> {
    let invalid = || DurationError(input.to_string());
    if input == "0" {
        return Ok(TimeDelta::zero());
    }
    if !DURATION_RE.is_match(input) {
        return Err(invalid());
    }

    let mut total_nanos: u128 = 0;
    for caps in DURATION_PART_RE.captures_iter(input) {
        let whole = caps.get(1).map_or("", |m| m.as_str());
        let fraction = caps.get(2).map_or("", |m| m.as_str());
        let unit: u128 = match caps.get(3).map_or("", |m| m.as_str()) {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        total_nanos = total_nanos
            .checked_add(whole.checked_mul(unit).ok_or_else(invalid)?)
            .ok_or_else(invalid)?;

        if !fraction.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let digits = fraction.get(..18).unwrap_or(fraction);
            let scale = 10u128.pow(u32::try_from(digits.len()).map_err(|_| invalid())?);
            let fraction: u128 = digits.parse().map_err(|_| invalid())?;
            total_nanos = total_nanos
                .checked_add(fraction * unit / scale)
                .ok_or_else(invalid)?;
        }
    }

    let nanos = i64::try_from(total_nanos).map_err(|_| invalid())?;
    let delta = TimeDelta::nanoseconds(nanos);
    Ok(if input.starts_with('-') { -delta } else { delta })
}

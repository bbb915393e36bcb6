use crate::errors::ActionError;
use crate::spec::GccSpec;

/// Validates a choice vector against the fetched capability spec.
///
/// Each element selects a choice for the option at the same index; `-1` means
/// "use the option's default". Validation runs entirely client-side and never
/// issues a network call on failure: a shape mismatch or out-of-range choice
/// is reported before anything reaches the channel.
pub fn validate_choices(choices: &[i64], spec: &GccSpec) -> Result<(), ActionError> {
    if choices.len() != spec.options.len() {
        return Err(ActionError::SpaceMismatch {
            expected: spec.options.len(),
            got: choices.len(),
        });
    }
    for (index, (&value, option)) in choices.iter().zip(&spec.options).enumerate() {
        let max = option.choices.len() as i64 - 1;
        if value < -1 || value > max {
            return Err(ActionError::OutOfRange { index, value, max });
        }
    }
    Ok(())
}

/// Encodes a validated choice vector for the `choices` parameter key:
/// comma-joined decimal integers.
pub fn encode_choices(choices: &[i64]) -> String {
    choices
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_choices`]. Returns `None` when any element fails to
/// parse as a decimal integer.
pub fn decode_choices(encoded: &str) -> Option<Vec<i64>> {
    if encoded.trim().is_empty() {
        return Some(Vec::new());
    }
    encoded
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect()
}

use std::ops::RangeInclusive;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates that a float is neither NaN nor infinite.
///
/// # Arguments
///
/// * `value` - The value to validate.
///
/// # Returns
///
/// * `Ok(())` if the value is finite.
/// * `Err(&'static str)` otherwise.
pub fn is_finite(value: f64) -> Result<(), &'static str> {
    if value.is_finite() {
        Ok(())
    } else {
        Err("Value must be finite")
    }
}

/// Validates that a float is finite and strictly greater than zero.
///
/// # Arguments
///
/// * `value` - The value to validate.
///
/// # Returns
///
/// * `Ok(())` if the value is positive.
/// * `Err(&'static str)` otherwise.
pub fn is_positive(value: f64) -> Result<(), &'static str> {
    is_finite(value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err("Value must be greater than 0")
    }
}

/// Validates if a given string is not empty.
///
/// # Arguments
///
/// * `value` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the string is not empty.
/// * `Err(&'static str)` if the string is empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that `value` is one of `allowed`, ignoring ASCII case.
pub fn is_one_of(value: &str, allowed: &[&str]) -> Result<(), &'static str> {
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
        Ok(())
    } else {
        Err("Value is not one of the accepted options")
    }
}

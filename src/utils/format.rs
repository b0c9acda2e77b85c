//! Compact float formatting for progress lines.

/// Formats `value` with `precision` decimals and drops the leading zero of
/// values strictly between -1 and 1 (`0.0123` -> `.0123`, `-0.5` -> `-.5`).
pub fn trim_leading_zero(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*}", precision, value);
    if value > -1.0 && value < 1.0 {
        formatted.replacen('0', "", 1)
    } else {
        formatted
    }
}

/// `"{global} / {current}"` as reported while basin hopping.
pub fn basin_status(global: f64, current: f64) -> String {
    format!(
        "{} / {}",
        trim_leading_zero(global, 5),
        trim_leading_zero(current, 5)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_leading_zero() {
        assert_eq!(trim_leading_zero(0.0123, 4), ".0123");
        assert_eq!(trim_leading_zero(-0.5, 2), "-.50");
        assert_eq!(trim_leading_zero(12.5, 1), "12.5");
        assert_eq!(trim_leading_zero(1.0, 2), "1.00");
    }

    #[test]
    fn test_basin_status() {
        assert_eq!(basin_status(0.01, 0.25), ".01000 / .25000");
    }
}

//! Bit-exact float formatting for gateway parameters.
//!
//! `CHAN_BW`, `FECENTER` and similar floating values are read back by
//! downstream header parsers expecting C's `%.17g` formatting (17
//! significant digits, shortest of fixed/exponential form). Rust has no
//! built-in `%g`, so this reproduces it directly.

/// Format `value` the way C's `printf("%.17g", value)` would.
pub fn format_g17(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let precision = 17usize;
    let exp = value.abs().log10().floor() as i32;

    // %g switches to exponential form when exponent < -4 or >= precision.
    if exp < -4 || exp >= precision as i32 {
        format_exponential(value, precision)
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        let s = format!("{:.*}", decimals, value);
        trim_trailing_zeros(&s)
    }
}

fn format_exponential(value: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision - 1, value);
    // Rust gives us "1.2345e2"; C gives "1.2345e+02". Normalize.
    let (mantissa, exp) = s.split_once('e').expect("exponential form has 'e'");
    let mantissa = trim_trailing_zeros(mantissa);
    let exp: i32 = exp.parse().expect("valid exponent");
    format!("{mantissa}e{}{:02}", if exp < 0 { "-" } else { "+" }, exp.abs())
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_value_has_no_decimal_point() {
        assert_eq!(format_g17(1712000000.0), "1712000000");
    }

    #[test]
    fn fractional_value_keeps_significant_digits() {
        assert_eq!(format_g17(856.0), "856");
        let formatted = format_g17(835.75);
        assert!(formatted.starts_with("835.75"));
    }

    #[test]
    fn zero_is_literal_zero() {
        assert_eq!(format_g17(0.0), "0");
    }

    #[test]
    fn small_magnitude_switches_to_exponential() {
        let formatted = format_g17(0.000001234);
        assert!(formatted.contains('e'));
    }
}

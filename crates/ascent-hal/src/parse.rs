//! Lenient parsing of remote field values.
//!
//! Remote part fields arrive as display strings ("1.2k", "NA", "True").  A
//! malformed field must never take the control cycle down, so every parser
//! here collapses bad input to a neutral default.

/// Parse a numeric field.  A trailing `k` multiplies by 1000; absent, empty
/// or unparsable input yields `0.0`.
///
/// ```rust
/// use ascent_hal::parse::parse_f64_or_zero;
///
/// assert_eq!(parse_f64_or_zero(Some("5k")), 5000.0);
/// assert_eq!(parse_f64_or_zero(Some("12.5")), 12.5);
/// assert_eq!(parse_f64_or_zero(Some("abc")), 0.0);
/// assert_eq!(parse_f64_or_zero(None), 0.0);
/// ```
pub fn parse_f64_or_zero(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else { return 0.0 };
    let trimmed = raw.trim();
    let (digits, scale) = match trimmed.strip_suffix(['k', 'K']) {
        Some(rest) => (rest.trim_end(), 1000.0),
        None => (trimmed, 1.0),
    };
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => v * scale,
        _ => 0.0,
    }
}

/// Parse a boolean field (`true`/`false`, case-insensitive).  Anything else
/// is `false`.
pub fn parse_bool(raw: Option<&str>) -> bool {
    raw.is_some_and(|s| s.trim().eq_ignore_ascii_case("true"))
}

/// Text field with the `"Unknown"` fallback.
pub fn text_or_unknown(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "Unknown".to_string(),
    }
}

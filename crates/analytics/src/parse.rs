//! Metric parser: formatted display strings to numbers
//!
//! Upstream stores metrics the way the backtester printed them: `"45.20%"`,
//! `"−12.50%"` (U+2212), `"$1,234.56"`. Every function here returns a finite
//! number for any input and `0` for anything it cannot read.

const UNICODE_MINUS: char = '\u{2212}';

/// Parse a percentage such as `"45.2%"` or `"1,234.56%"` (returns `45.2`, `1234.56`)
pub fn parse_percentage(raw: Option<&str>) -> f64 {
    parse_metric(raw)
}

/// Parse a dollar amount such as `"$1,234.56"` or `"-$500"`
pub fn parse_dollar(raw: Option<&str>) -> f64 {
    parse_metric(raw)
}

/// Parse a count such as `"148"` or `"1,024"`; fractional parts are truncated
pub fn parse_count(raw: Option<&str>) -> i64 {
    let Some(cleaned) = normalize(raw) else {
        return 0;
    };
    let prefix = numeric_prefix(&cleaned);
    // Integer part only, like parseInt on "12.9" -> 12
    let integer = prefix.split(['.', 'e', 'E']).next().unwrap_or_default();
    integer.parse::<i64>().unwrap_or(0)
}

/// Shared path for percentage, dollar and plain decimal metrics
pub fn parse_metric(raw: Option<&str>) -> f64 {
    let Some(cleaned) = normalize(raw) else {
        return 0.0;
    };
    numeric_prefix(&cleaned)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Replace U+2212, drop `%`, `$` and `,`, trim. `None` when nothing is left.
fn normalize(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '%' | '$' | ','))
        .map(|c| if c == UNICODE_MINUS { '-' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Longest leading decimal numeral: `[+-]digits[.digits][e[+-]digits]`.
/// Trailing text is ignored; an empty slice means no numeral.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < len && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if end < len && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut j = frac_start;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        mantissa_digits += j - frac_start;
        end = j;
    }

    if mantissa_digits == 0 {
        return "";
    }

    if end < len && matches!(bytes[end], b'e' | b'E') {
        let mut j = end + 1;
        if j < len && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }

    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_basic_values() {
        assert_eq!(parse_percentage(None), 0.0);
        assert_eq!(parse_percentage(Some("")), 0.0);
        assert_eq!(parse_percentage(Some("45.2%")), 45.2);
        assert_eq!(parse_percentage(Some("1,234.56%")), 1234.56);
        assert_eq!(parse_percentage(Some("  7.5 % ")), 7.5);
    }

    #[test]
    fn test_percentage_unicode_minus() {
        assert_eq!(parse_percentage(Some("\u{2212}12.50%")), -12.5);
        assert_eq!(parse_percentage(Some("-12.50%")), -12.5);
    }

    #[test]
    fn test_dollar_values() {
        assert_eq!(parse_dollar(Some("$1,234.56")), 1234.56);
        assert_eq!(parse_dollar(Some("-$500")), -500.0);
        assert_eq!(parse_dollar(Some("\u{2212}$2,000")), -2000.0);
        assert_eq!(parse_dollar(None), 0.0);
    }

    #[test]
    fn test_bare_symbols_parse_to_zero() {
        assert_eq!(parse_percentage(Some("-")), 0.0);
        assert_eq!(parse_percentage(Some("%")), 0.0);
        assert_eq!(parse_percentage(Some(".")), 0.0);
        assert_eq!(parse_dollar(Some("$")), 0.0);
        assert_eq!(parse_percentage(Some("N/A")), 0.0);
    }

    #[test]
    fn test_trailing_text_is_ignored() {
        assert_eq!(parse_metric(Some("1.87x")), 1.87);
        assert_eq!(parse_metric(Some("3.5 (est)")), 3.5);
        assert_eq!(parse_metric(Some("1.2.3")), 1.2);
        assert_eq!(parse_metric(Some(".5")), 0.5);
        assert_eq!(parse_metric(Some("2e3")), 2000.0);
        assert_eq!(parse_metric(Some("2e")), 2.0);
    }

    #[test]
    fn test_result_is_always_finite() {
        for raw in ["1e999", "-1e999", "Infinity", "NaN", "inf", "\u{2212}", "abc", "--5"] {
            let v = parse_metric(Some(raw));
            assert!(v.is_finite(), "{raw} -> {v}");
            assert_eq!(v, 0.0, "{raw}");
        }
    }

    #[test]
    fn test_count_values() {
        assert_eq!(parse_count(Some("148")), 148);
        assert_eq!(parse_count(Some("1,024")), 1024);
        assert_eq!(parse_count(Some("12.9")), 12);
        assert_eq!(parse_count(Some("\u{2212}3")), -3);
        assert_eq!(parse_count(Some("")), 0);
        assert_eq!(parse_count(None), 0);
        assert_eq!(parse_count(Some("many")), 0);
        assert_eq!(parse_count(Some(".7")), 0);
    }
}

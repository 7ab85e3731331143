use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Parse a monetary value as the upstream APIs report it: plain numbers,
/// currency symbols, Latin-American separators ("1.234.567", "1.234,56").
/// Malformed input is a skip for the caller, not an error.
pub fn parse_money(raw: &str) -> Option<BigDecimal> {
    let mut cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ' ' | '\u{a0}' | '\t'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.contains(',') {
        // "1.234.567,89": dots are thousands separators, comma is decimal
        cleaned = cleaned.replace('.', "").replacen(',', ".", 1);
    } else {
        let dots = cleaned.matches('.').count();
        if dots > 1 {
            // "1.234.567": thousands-separated integer
            cleaned = cleaned.replace('.', "");
        } else if dots == 1 {
            // A single dot followed by exactly three digits is a thousands
            // separator in this data ("45.000"), not cents.
            if let Some((_, frac)) = cleaned.split_once('.') {
                if frac.len() == 3 && frac.chars().all(|c| c.is_ascii_digit()) {
                    cleaned = cleaned.replace('.', "");
                }
            }
        }
    }

    BigDecimal::from_str(&cleaned).ok()
}

/// Same cleaning for values that may arrive as a JSON number or string.
pub fn parse_money_value(value: &serde_json::Value) -> Option<BigDecimal> {
    match value {
        serde_json::Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => parse_money(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_thousands_separated_integer() {
        assert_eq!(parse_money("1.234.567"), Some(dec("1234567")));
        assert_eq!(parse_money("45.000"), Some(dec("45000")));
    }

    #[test]
    fn test_comma_decimal() {
        assert_eq!(parse_money("1.234,56"), Some(dec("1234.56")));
        assert_eq!(parse_money("0,5"), Some(dec("0.5")));
    }

    #[test]
    fn test_currency_symbol_and_spaces() {
        assert_eq!(parse_money("$ 89.900"), Some(dec("89900")));
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(parse_money("120000"), Some(dec("120000")));
        assert_eq!(parse_money("12.5"), Some(dec("12.5")));
        assert_eq!(parse_money("-3.500"), Some(dec("-3500")));
    }

    #[test]
    fn test_malformed_is_none() {
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("N/A"), None);
        assert_eq!(parse_money("$"), None);
    }

    #[test]
    fn test_json_number_or_string() {
        assert_eq!(
            parse_money_value(&serde_json::json!("1.234.567")),
            Some(dec("1234567"))
        );
        assert_eq!(parse_money_value(&serde_json::json!(89900)), Some(dec("89900")));
        assert_eq!(parse_money_value(&serde_json::json!(null)), None);
    }
}

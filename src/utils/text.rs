/// Text normalization helpers used by the consolidation pipeline
use regex::Regex;
use std::sync::OnceLock;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)*").unwrap())
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    whitespace_re().replace_all(s.trim(), " ").to_string()
}

/// Check if string is empty or whitespace only
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Extract the first numeric substring from a price-like string.
///
/// Thousands separators are stripped; a trailing comma-group of two digits is
/// treated as a decimal separator ("1.299,95" and "1,299.95" both parse).
pub fn extract_numeric(s: &str) -> Option<f64> {
    let raw = numeric_re().find(s)?.as_str();

    let normalized = if let Some(idx) = raw.rfind([',', '.']) {
        let (head, tail) = raw.split_at(idx);
        let decimals = &tail[1..];
        if decimals.len() == 3 && !head.is_empty() {
            // "1,299" style group separator, no decimal part
            format!("{}{}", strip_separators(head), decimals)
        } else {
            format!("{}.{}", strip_separators(head), decimals)
        }
    } else {
        raw.to_string()
    };

    normalized.parse::<f64>().ok()
}

fn strip_separators(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Rewrite a URL to its canonical absolute form when parseable.
pub fn canonicalize_url(s: &str) -> Option<String> {
    url::Url::parse(s).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  hello   world \n"), "hello world");
        assert_eq!(collapse_whitespace("a\t\tb"), "a b");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank("  \t\n"));
        assert!(!is_blank(" x "));
    }

    #[test]
    fn test_extract_numeric() {
        assert_eq!(extract_numeric("$19.99"), Some(19.99));
        assert_eq!(extract_numeric("EUR 1.299,95"), Some(1299.95));
        assert_eq!(extract_numeric("1,299.95 USD"), Some(1299.95));
        assert_eq!(extract_numeric("1,299"), Some(1299.0));
        assert_eq!(extract_numeric("42"), Some(42.0));
        assert_eq!(extract_numeric("free shipping"), None);
    }

    #[test]
    fn test_canonicalize_url() {
        assert_eq!(
            canonicalize_url("https://example.com/a/../b"),
            Some("https://example.com/b".to_string())
        );
        assert_eq!(canonicalize_url("not a url"), None);
    }
}

//! Cookie header parsing and Set-Cookie formatting.
//!
//! Reading: the `cookie` header is split on `;`, each pair on its first `=`,
//! the key trimmed and the value percent-decoded. Writing: one `key=value;`
//! string per cookie.

use std::collections::HashMap;

/// Parse a `cookie` request header into a map.
///
/// Later duplicates overwrite earlier ones. Segments with an empty key are skipped.
/// Values that fail to decode are kept verbatim.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for pair in header.split(';') {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key.trim(), value),
            None => (pair.trim(), ""),
        };
        if key.is_empty() {
            continue;
        }
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.insert(key.to_string(), value);
    }

    cookies
}

/// Format one Set-Cookie value.
pub fn format_set_cookie(key: &str, value: &str) -> String {
    format!("{}={};", key, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pairs() {
        let cookies = parse_cookie_header("user=ada; theme=dark");
        assert_eq!(cookies.get("user").map(String::as_str), Some("ada"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn test_value_split_on_first_equals() {
        let cookies = parse_cookie_header("token=a=b=c");
        assert_eq!(cookies.get("token").map(String::as_str), Some("a=b=c"));
    }

    #[test]
    fn test_value_is_percent_decoded() {
        let cookies = parse_cookie_header("name=John%20Doe");
        assert_eq!(cookies.get("name").map(String::as_str), Some("John Doe"));
    }

    #[test]
    fn test_invalid_encoding_kept_verbatim() {
        let cookies = parse_cookie_header("raw=%FF%FE");
        assert_eq!(cookies.get("raw").map(String::as_str), Some("%FF%FE"));
    }

    #[test]
    fn test_empty_and_bare_segments() {
        let cookies = parse_cookie_header("a=1;; flag; ");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn test_format_set_cookie() {
        assert_eq!(format_set_cookie("user", "ada"), "user=ada;");
    }
}

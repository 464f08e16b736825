//! Multi-value query parameter dictionary.
//!
//! [`QueryDict`] holds decoded query-string (or form body) parameters. A key
//! may repeat, and the order in which values arrived is preserved.

use fnroute_core::utils::MultiValueDict;

/// Decoded `application/x-www-form-urlencoded` parameters.
///
/// `QueryDict` is immutable once parsed; a [`RequestView`](crate::RequestView)
/// exposes it by reference.
///
/// # Examples
///
/// ```
/// use fnroute_http::QueryDict;
///
/// let qd = QueryDict::parse("color=red&color=blue&size=L");
/// assert_eq!(qd.get("color"), Some("red"));
/// assert_eq!(qd.get_list("color"), Some(&["red".to_string(), "blue".to_string()][..]));
/// assert_eq!(qd.get("size"), Some("L"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryDict {
    data: MultiValueDict<String, String>,
}

impl QueryDict {
    /// Creates an empty `QueryDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a query string such as `a=1&b=2&a=3`.
    ///
    /// Keys and values are percent-decoded and `+` is treated as a space.
    /// Empty pairs are skipped; a key without `=` gets an empty value.
    pub fn parse(query_string: &str) -> Self {
        let data = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (percent_decode(key), percent_decode(value))
            })
            .collect();
        Self { data }
    }

    /// Returns the first value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Returns the last value for a key.
    pub fn get_last(&self, key: &str) -> Option<&str> {
        self.data.get_last(key).map(String::as_str)
    }

    /// Returns every value for a key, in arrival order.
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.data.get_list(key)
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the distinct keys in arrival order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Re-encodes the parameters, preserving arrival order.
    pub fn urlencode(&self) -> String {
        self.data
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| format!("{}={}", percent_encode(key), percent_encode(value)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn percent_decode(input: &str) -> String {
    let plus_decoded = input.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn percent_encode(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let qd = QueryDict::new();
        assert!(qd.is_empty());
        assert_eq!(qd.len(), 0);
    }

    #[test]
    fn test_parse_repeated_keys_keep_order() {
        let qd = QueryDict::parse("color=red&color=blue&color=green");
        assert_eq!(qd.get("color"), Some("red"));
        assert_eq!(qd.get_last("color"), Some("green"));
        assert_eq!(qd.get_list("color").map(<[String]>::len), Some(3));
    }

    #[test]
    fn test_parse_no_value_and_empty_value() {
        let qd = QueryDict::parse("flag&empty=");
        assert_eq!(qd.get("flag"), Some(""));
        assert_eq!(qd.get("empty"), Some(""));
    }

    #[test]
    fn test_parse_percent_and_plus() {
        let qd = QueryDict::parse("name=hello%20world&city=New+York");
        assert_eq!(qd.get("name"), Some("hello world"));
        assert_eq!(qd.get("city"), Some("New York"));
    }

    #[test]
    fn test_parse_skips_empty_pairs() {
        let qd = QueryDict::parse("a=1&&b=2&");
        assert_eq!(qd.len(), 2);
        assert_eq!(qd.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let qd = QueryDict::parse("expr=a%3Db=c");
        assert_eq!(qd.get("expr"), Some("a=b=c"));
    }

    #[test]
    fn test_urlencode_preserves_order() {
        let qd = QueryDict::parse("b=2&a=hello world&b=3");
        assert_eq!(qd.urlencode(), "b=2&b=3&a=hello%20world");
    }

    #[test]
    fn test_contains_key() {
        let qd = QueryDict::parse("key=value");
        assert!(qd.contains_key("key"));
        assert!(!qd.contains_key("missing"));
        assert_eq!(qd.get("missing"), None);
    }
}

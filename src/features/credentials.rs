//! AppState parsing — turns a pasted browser session export into a cookie set.
//!
//! Operators paste whatever their cookie-export extension produced.  Four
//! shapes are accepted, tried in a fixed order:
//!
//! 1. JSON array of `{ "name"|"key": .., "value"|"val": .. }` objects
//! 2. JSON object with a `cookies` array of the same element shape
//! 3. Flat JSON object of scalar values (`{ "c_user": "1", "xs": "..." }`)
//! 4. Raw `Cookie:` header text (`c_user=1; xs=...`)
//!
//! An array-valued `cookies` key always wins over the flat-object reading, so
//! `{ "cookies": [..], "other": "x" }` never yields a cookie called `other`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("AppState is empty")]
    Empty,
    #[error("AppState contained no usable cookies ({0})")]
    NoCookies(&'static str),
}

/// Immutable, non-empty cookie set for one task.
///
/// Keeps insertion order so the rendered `Cookie:` header is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    cookies: Vec<(String, String)>,
}

impl CredentialSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(|(k, _)| k.as_str())
    }

    /// Value for a `Cookie:` request header, e.g. `c_user=1; xs=abc`.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn from_pairs<I>(pairs: I, shape: &'static str) -> Result<Self, CredentialError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cookies: Vec<(String, String)> = Vec::new();
        for (name, value) in pairs {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            match cookies.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value,
                None => cookies.push((name, value)),
            }
        }
        if cookies.is_empty() {
            return Err(CredentialError::NoCookies(shape));
        }
        Ok(Self { cookies })
    }
}

/// Parse a pasted AppState blob into a [`CredentialSet`].
pub fn parse_app_state(raw: &str) -> Result<CredentialSet, CredentialError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CredentialError::Empty);
    }

    if raw.starts_with('[') || raw.starts_with('{') {
        if let Ok(json) = serde_json::from_str::<Value>(raw) {
            return from_json(&json);
        }
        // Looks like JSON but is not; a cookie string cannot start with a
        // bracket either, so there is nothing left to try.
        return Err(CredentialError::NoCookies("malformed JSON"));
    }

    parse_cookie_string(raw)
}

fn from_json(json: &Value) -> Result<CredentialSet, CredentialError> {
    match json {
        Value::Array(items) => CredentialSet::from_pairs(cookie_objects(items), "JSON array"),
        Value::Object(map) => match map.get("cookies") {
            Some(Value::Array(items)) => {
                CredentialSet::from_pairs(cookie_objects(items), "JSON cookies array")
            }
            _ => CredentialSet::from_pairs(
                map.iter()
                    .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v))),
                "flat JSON object",
            ),
        },
        _ => Err(CredentialError::NoCookies("unsupported JSON value")),
    }
}

fn cookie_objects(items: &[Value]) -> impl Iterator<Item = (String, String)> + '_ {
    items.iter().filter_map(|item| {
        let name = item
            .get("name")
            .or_else(|| item.get("key"))
            .and_then(Value::as_str)?;
        let value = item
            .get("value")
            .or_else(|| item.get("val"))
            .and_then(scalar_to_string)?;
        Some((name.to_string(), value))
    })
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_cookie_string(raw: &str) -> Result<CredentialSet, CredentialError> {
    let pairs = raw.split(';').filter_map(|segment| {
        let (k, v) = segment.split_once('=')?;
        Some((k.trim().to_string(), v.trim().to_string()))
    });
    CredentialSet::from_pairs(pairs, "cookie string")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Vec<(&'static str, &'static str)> {
        vec![("c_user", "1000"), ("xs", "abc%3A1")]
    }

    fn assert_expected(set: &CredentialSet) {
        assert_eq!(set.len(), 2);
        for (k, v) in expected() {
            assert_eq!(set.get(k), Some(v), "cookie {k}");
        }
    }

    #[test]
    fn parses_json_array_with_name_value() {
        let raw = r#"[{"name":"c_user","value":"1000"},{"name":"xs","value":"abc%3A1"}]"#;
        assert_expected(&parse_app_state(raw).unwrap());
    }

    #[test]
    fn parses_json_array_with_key_val_aliases() {
        let raw = r#"[{"key":"c_user","val":"1000","domain":".example.com"},{"key":"xs","value":"abc%3A1"}]"#;
        assert_expected(&parse_app_state(raw).unwrap());
    }

    #[test]
    fn parses_object_with_cookies_array() {
        let raw = r#"{"url":"https://example.com","cookies":[{"name":"c_user","value":"1000"},{"name":"xs","value":"abc%3A1"}]}"#;
        let set = parse_app_state(raw).unwrap();
        assert_expected(&set);
        assert!(set.get("url").is_none(), "cookies array must win over flat keys");
    }

    #[test]
    fn parses_flat_object_and_skips_nested_values() {
        let raw = r#"{"c_user":"1000","xs":"abc%3A1","meta":{"a":1}}"#;
        assert_expected(&parse_app_state(raw).unwrap());
    }

    #[test]
    fn parses_cookie_string() {
        let set = parse_app_state(" c_user=1000 ; xs=abc%3A1; junk ;").unwrap();
        assert_expected(&set);
        assert_eq!(set.header_value(), "c_user=1000; xs=abc%3A1");
    }

    #[test]
    fn later_duplicates_overwrite() {
        let set = parse_app_state("a=1; a=2").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a"), Some("2"));
    }

    #[test]
    fn rejects_empty_and_unparseable() {
        assert_eq!(parse_app_state("   "), Err(CredentialError::Empty));
        assert!(parse_app_state("no pairs here").is_err());
        assert!(parse_app_state("[]").is_err());
        assert!(parse_app_state(r#"{"cookies":[]}"#).is_err());
        assert!(parse_app_state("{not json").is_err());
        assert!(parse_app_state(r#"[{"value":"orphan"}]"#).is_err());
    }

    #[test]
    fn value_containing_equals_is_kept_whole() {
        let set = tokio_test::assert_ok!(parse_app_state("token=a=b=c"));
        assert_eq!(set.get("token"), Some("a=b=c"));
    }
}

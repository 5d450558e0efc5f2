//! Shared URL/form parsing and JSON reply helpers for route handlers.

use std::str::FromStr;

use serde::Serialize;

use crate::error::{StagingError, StagingResult};
use crate::game::session::{Session, export_view_json, with_session_mut};

/// Decoded `key=value&key2=value2` pairs from a query string or form body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Parse a query string (leading `?` optional) or URL-encoded body.
    pub fn parse(input: &str) -> Self {
        let input = input.strip_prefix('?').unwrap_or(input);
        let pairs = input
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
                (percent_decode(key), percent_decode(val))
            })
            .collect();
        Self { pairs }
    }

    /// Query and body merged; body values win on duplicate keys.
    pub fn merged(query: &str, body: &str) -> Self {
        let mut params = Self::parse(body);
        params.pairs.extend(Self::parse(query).pairs);
        params
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First non-empty value for `key`.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> StagingResult<&str> {
        self.non_empty(key)
            .ok_or_else(|| StagingError::invalid(format!("missing `{}`", key)))
    }

    /// Optional typed value; present but unparsable is an error.
    pub fn parse_as<T: FromStr>(&self, key: &str) -> StagingResult<Option<T>> {
        match self.non_empty(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StagingError::invalid(format!("bad `{}`: {}", key, raw))),
        }
    }

    pub fn require_as<T: FromStr>(&self, key: &str) -> StagingResult<T> {
        self.parse_as(key)?
            .ok_or_else(|| StagingError::invalid(format!("missing `{}`", key)))
    }

    /// Value decoded with a domain parser such as `Stance::parse`.
    pub fn require_with<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> StagingResult<T> {
        let raw = self.require(key)?;
        parse(raw).ok_or_else(|| StagingError::invalid(format!("bad `{}`: {}", key, raw)))
    }

    pub fn optional_with<T>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> StagingResult<Option<T>> {
        match self.non_empty(key) {
            None => Ok(None),
            Some(_) => self.require_with(key, parse).map(Some),
        }
    }
}

/// Percent-decode a URL-encoded value. Multi-byte sequences decode as UTF-8;
/// malformed escapes are kept literally.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                match (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: Option<&u8>) -> Option<u8> {
    (*b? as char).to_digit(16).map(|d| d as u8)
}

/// Serialize a reply body. Serialization of our own types cannot fail in
/// practice; an error body is returned if it ever does.
pub fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| error_body(&e.to_string()))
}

pub fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Run a mutating handler against the session and reply with the view.
///
/// `now=` advances the logical clock first. A rejection from `op` becomes a
/// notice on the outbox; the reply is the view either way.
pub fn respond(params: &Params, op: impl FnOnce(&mut Session, &Params) -> StagingResult<()>) -> String {
    with_session_mut(|s| {
        let result = params
            .parse_as::<u64>("now")
            .and_then(|now| {
                s.advance_clock(now);
                op(s, params)
            });
        if let Err(e) = result {
            s.report(&e);
        }
    });
    export_view_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_form_body() {
        let p = Params::parse("threat=t1&row=0&now=150");
        assert_eq!(p.get("threat"), Some("t1"));
        assert_eq!(p.require_as::<usize>("row"), Ok(0));
        assert_eq!(p.parse_as::<u64>("now"), Ok(Some(150)));
    }

    #[test]
    fn empty_input_has_no_pairs() {
        assert_eq!(Params::parse(""), Params::default());
        assert_eq!(Params::parse("?"), Params::default());
    }

    #[test]
    fn query_prefix_is_stripped() {
        let p = Params::parse("?player=rival");
        assert_eq!(p.get("player"), Some("rival"));
    }

    #[test]
    fn body_wins_over_query() {
        let p = Params::merged("?now=1&card=m1", "now=2");
        assert_eq!(p.get("now"), Some("2"));
        assert_eq!(p.get("card"), Some("m1"));
    }

    #[test]
    fn missing_and_bad_values_are_invalid_input() {
        let p = Params::parse("count=lots&empty=");
        assert!(matches!(p.require("empty"), Err(StagingError::InvalidInput { .. })));
        assert!(matches!(
            p.require_as::<u32>("count"),
            Err(StagingError::InvalidInput { .. })
        ));
        assert_eq!(p.parse_as::<u32>("absent"), Ok(None));
    }

    #[test]
    fn percent_decode_handles_plus_hex_and_utf8() {
        assert_eq!(percent_decode("hello+world"), "hello world");
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn malformed_escapes_are_kept() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%4"), "%4");
    }

    #[test]
    fn error_body_is_json() {
        assert_eq!(error_body("nope"), r#"{"error":"nope"}"#);
    }
}

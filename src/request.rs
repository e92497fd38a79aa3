//! Incoming HTTP request view.
//!
//! One [`Request`] exists per in-flight request. Steps see it read-only; the
//! two write paths — the parsed body set by the content step and normalized
//! data set by validation steps — go through set-once cells, so a value a
//! step observed can never change under it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::method::Method;

// ── ValidateTarget ───────────────────────────────────────────────────────────

/// Which part of the request a validation step runs against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidateTarget {
    Query,
    Body,
    Params,
    Headers,
}

impl ValidateTarget {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Query   => "query",
            Self::Body    => "body",
            Self::Params  => "params",
            Self::Headers => "headers",
        }
    }
}

impl fmt::Display for ValidateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized validation output, one set-once slot per target.
#[derive(Debug, Default)]
struct Validated {
    query: OnceLock<Value>,
    body: OnceLock<Value>,
    params: OnceLock<Value>,
    headers: OnceLock<Value>,
}

impl Validated {
    fn slot(&self, target: ValidateTarget) -> &OnceLock<Value> {
        match target {
            ValidateTarget::Query   => &self.query,
            ValidateTarget::Body    => &self.body,
            ValidateTarget::Params  => &self.params,
            ValidateTarget::Headers => &self.headers,
        }
    }
}

// ── Request ──────────────────────────────────────────────────────────────────

/// An incoming HTTP request.
///
/// Constructed by the server from the wire, or directly in tests:
///
/// ```rust
/// use stave::{Method, Request};
///
/// let req = Request::new(Method::Post, "/users?notify=1")
///     .with_header("content-type", "application/json")
///     .with_body(r#"{"name":"alice"}"#);
/// assert_eq!(req.query("notify"), Some("1"));
/// ```
pub struct Request {
    method: Method,
    path: String,
    query: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    params: HashMap<String, String>,
    correlation: Uuid,
    parsed_body: OnceLock<Value>,
    validated: Validated,
}

impl Request {
    /// Builds a request for `target` (a path with an optional query string).
    /// A fresh correlation id is minted here — one per request, stamped onto
    /// any error the request produces.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, BTreeMap::new()),
        };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: Vec::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            correlation: Uuid::new_v4(),
            parsed_body: OnceLock::new(),
            validated: Validated::default(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn correlation(&self) -> Uuid { self.correlation }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a decoded query-string value.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The body as parsed by the route's content step, if one ran.
    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body.get()
    }

    /// Normalized data produced by the route's validation step for `target`.
    pub fn validated(&self, target: ValidateTarget) -> Option<&Value> {
        self.validated.slot(target).get()
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn set_parsed_body(&self, value: Value) {
        // First write wins; the content step runs at most once per request.
        let _ = self.parsed_body.set(value);
    }

    pub(crate) fn set_validated(&self, target: ValidateTarget, value: Value) {
        let _ = self.validated.slot(target).set(value);
    }

    /// Snapshot of `target` as a JSON value, the form handed to validators.
    pub(crate) fn target_value(&self, target: ValidateTarget) -> Value {
        match target {
            ValidateTarget::Query => Value::Object(
                self.query
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            ValidateTarget::Params => Value::Object(
                self.params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            ValidateTarget::Headers => {
                let mut out = Map::new();
                for (k, v) in &self.headers {
                    out.insert(k.to_ascii_lowercase(), Value::String(v.clone()));
                }
                Value::Object(out)
            }
            ValidateTarget::Body => self.parsed_body.get().cloned().unwrap_or(Value::Null),
        }
    }
}

/// Decodes an `application/x-www-form-urlencoded` query string. Later
/// duplicates of a key win.
fn parse_query(raw: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let (Some(key), Some(value)) = (decode_component(key), decode_component(value)) {
            out.insert(key, value);
        }
    }
    out
}

/// Percent-decodes one form component, with `+` meaning space.
pub(crate) fn decode_component(raw: &str) -> Option<String> {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

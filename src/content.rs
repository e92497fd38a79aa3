//! Content-type negotiation and body parsing.
//!
//! A route declares which MIME types it accepts and how each parses. At
//! build time the whole policy compiles down to exactly one step inserted at
//! the front of the chain, dispatching on the inbound `content-type` header.
//! Types the route never declared are refused with `415` — the default is
//! reject, not guess.
//!
//! Routes on GET / OPTIONS / HEAD never get this step, whatever they declare.

use serde_json::Value;

use crate::error::RequestError;
use crate::request::decode_component;
use crate::step::{Flow, Step, StepCtx};
use http::StatusCode;

/// The name of the synthesized parsing step.
pub(crate) const CONTENT_STEP: &str = "content";

// ── BodyParser ───────────────────────────────────────────────────────────────

/// How the body of one accepted content type is turned into a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BodyParser {
    /// `serde_json` into a JSON value.
    Json,
    /// `application/x-www-form-urlencoded` pairs into a JSON object.
    Form,
    /// UTF-8 text into a JSON string.
    Text,
    /// No parsing; the raw bytes stay available via `Request::body`.
    Raw,
}

impl BodyParser {
    fn parse(self, body: &[u8]) -> Result<Value, RequestError> {
        match self {
            Self::Json => serde_json::from_slice(body).map_err(|e| {
                RequestError::client(
                    StatusCode::BAD_REQUEST,
                    "MALFORMED_BODY",
                    format!("invalid JSON body: {e}"),
                )
            }),
            Self::Form => {
                let text = std::str::from_utf8(body).map_err(|_| malformed_utf8())?;
                let mut out = serde_json::Map::new();
                for pair in text.split('&').filter(|p| !p.is_empty()) {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    match (decode_component(key), decode_component(value)) {
                        (Some(key), Some(value)) => { out.insert(key, Value::String(value)); }
                        _ => return Err(malformed_utf8()),
                    }
                }
                Ok(Value::Object(out))
            }
            Self::Text => std::str::from_utf8(body)
                .map(|s| Value::String(s.to_owned()))
                .map_err(|_| malformed_utf8()),
            Self::Raw => Ok(Value::Null),
        }
    }
}

fn malformed_utf8() -> RequestError {
    RequestError::client(StatusCode::BAD_REQUEST, "MALFORMED_BODY", "body is not valid UTF-8")
}

// ── ContentPolicy ────────────────────────────────────────────────────────────

/// The ordered accept-list for one route.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContentPolicy {
    accepted: Vec<(String, BodyParser)>,
}

impl ContentPolicy {
    /// Accepts `mime` with `parser`. Idempotent per type: the first
    /// declaration wins, later ones are ignored.
    pub(crate) fn accept(&mut self, mime: &str, parser: BodyParser) {
        let mime = normalize(mime);
        if !self.accepted.iter().any(|(m, _)| *m == mime) {
            self.accepted.push((mime, parser));
        }
    }

    /// Removes `mime` from the accepted set. Accepting it again later
    /// restores it.
    pub(crate) fn reject(&mut self, mime: &str) {
        let mime = normalize(mime);
        self.accepted.retain(|(m, _)| *m != mime);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    fn lookup(&self, mime: &str) -> Option<BodyParser> {
        self.accepted.iter().find(|(m, _)| m == mime).map(|(_, p)| *p)
    }

    /// Compiles the policy into the single parsing step.
    pub(crate) fn parse_step(&self) -> Step {
        let policy = self.clone();
        Step::new(CONTENT_STEP, move |ctx: StepCtx, _input: Value| {
            let policy = policy.clone();
            async move {
                let request = ctx.request();
                let mime = request
                    .header("content-type")
                    .map(|v| normalize(v.split(';').next().unwrap_or(v)));
                let Some(mime) = mime else {
                    if request.body().is_empty() {
                        return Ok(Flow::Next(Value::Null));
                    }
                    return Err(unsupported("request carries a body but no content-type header"));
                };
                let Some(parser) = policy.lookup(&mime) else {
                    return Err(unsupported(format!("unsupported content type `{mime}`")));
                };
                let value = parser.parse(request.body())?;
                request.set_parsed_body(value.clone());
                Ok(Flow::Next(value))
            }
        })
    }
}

fn unsupported(message: impl Into<String>) -> RequestError {
    RequestError::client(StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE", message)
}

fn normalize(mime: &str) -> String {
    mime.trim().to_ascii_lowercase()
}

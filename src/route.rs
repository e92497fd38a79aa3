//! Declarative route builder.
//!
//! A [`Route`] is one endpoint: method + URL template + an ordered chain of
//! named steps, plus the declared response schemas and content-type policy.
//! Declaration is eager about mistakes — a bad method string, an empty URL,
//! a duplicate step name, or a catch with nothing to attach to fails right
//! there with a [`ConfigurationError`] instead of surfacing mid-request.
//!
//! ```rust
//! use stave::{Flow, Route, Schema, StepCtx, ValidateTarget};
//! use serde_json::Value;
//!
//! # fn build() -> Result<Route, stave::ConfigurationError> {
//! let route = Route::post("/users")?
//!     .describe("Create a user")
//!     .accepts("application/json", stave::BodyParser::Json)
//!     .validate(ValidateTarget::Body, Schema::object()
//!         .prop("name", Schema::string())
//!         .require("name"))?
//!     .main(|ctx: StepCtx, _input: Value| async move {
//!         let body = ctx.request().validated(ValidateTarget::Body).cloned();
//!         ctx.reply().filter(body.unwrap_or(Value::Null));
//!         Ok(Flow::done())
//!     })?
//!     .responds_with(http::StatusCode::OK, Schema::object().prop("name", Schema::string()));
//! # Ok(route) }
//! ```

use std::collections::BTreeMap;

use http::StatusCode;
use regex::Regex;
use serde_json::Value;

use crate::app::AppConfig;
use crate::content::{BodyParser, ContentPolicy};
use crate::error::{ConfigurationError, RequestError};
use crate::method::Method;
use crate::schema::{Schema, SchemaRef};
use crate::step::{Catch, CatchFn, ErrorFilter, Flow, MAIN_STEP, NOOP_STEP, Step, StepCtx, StepFn};
use crate::request::ValidateTarget;

// ── Route ────────────────────────────────────────────────────────────────────

pub(crate) struct Compiled {
    pub(crate) id: String,
    pub(crate) matchit_path: String,
    pub(crate) constraints: Vec<(String, Regex)>,
}

/// One declared endpoint and its processing chain.
pub struct Route {
    pub(crate) method: Method,
    url: String,
    resource: Option<String>,
    version: Option<u32>,
    description: Option<String>,
    pub(crate) steps: Vec<Step>,
    responses: BTreeMap<u16, Vec<SchemaRef>>,
    content: ContentPolicy,
    pub(crate) compiled: Option<Compiled>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("resource", &self.resource)
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Route {
    /// Declares a route. The URL template must be non-empty, start with `/`,
    /// and only use `{name}` (or `{name:regex}`) parameter segments.
    pub fn new(method: Method, url: &str) -> Result<Self, ConfigurationError> {
        if url.is_empty() {
            return Err(ConfigurationError::EmptyUrl);
        }
        if !url.starts_with('/') {
            return Err(ConfigurationError::InvalidUrl {
                url: url.to_owned(),
                reason: "must start with `/`".to_owned(),
            });
        }
        // Fail template mistakes now, not at build.
        parse_template(url)?;
        Ok(Self {
            method,
            url: url.to_owned(),
            resource: None,
            version: None,
            description: None,
            steps: Vec::new(),
            responses: BTreeMap::new(),
            content: ContentPolicy::default(),
            compiled: None,
        })
    }

    /// Declares a route from a method string, failing fast on an unknown one.
    pub fn with_method_str(method: &str, url: &str) -> Result<Self, ConfigurationError> {
        Self::new(Method::parse(method)?, url)
    }

    pub fn get(url: &str) -> Result<Self, ConfigurationError>     { Self::new(Method::Get, url) }
    pub fn post(url: &str) -> Result<Self, ConfigurationError>    { Self::new(Method::Post, url) }
    pub fn put(url: &str) -> Result<Self, ConfigurationError>     { Self::new(Method::Put, url) }
    pub fn patch(url: &str) -> Result<Self, ConfigurationError>   { Self::new(Method::Patch, url) }
    pub fn delete(url: &str) -> Result<Self, ConfigurationError>  { Self::new(Method::Delete, url) }
    pub fn options(url: &str) -> Result<Self, ConfigurationError> { Self::new(Method::Options, url) }
    pub fn head(url: &str) -> Result<Self, ConfigurationError>    { Self::new(Method::Head, url) }

    /// Human-readable description, surfaced through route introspection.
    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    /// Overrides the resource name used by the `{resource}` id token.
    /// Defaults to the first static URL segment.
    pub fn resource(mut self, name: &str) -> Self {
        self.resource = Some(name.to_owned());
        self
    }

    /// Declares the API version used by the `{version}` id token.
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    // ── Chain declaration ────────────────────────────────────────────────────

    /// Appends a named step. Names are unique within a route.
    pub fn step(mut self, name: &str, handler: impl StepFn) -> Result<Self, ConfigurationError> {
        if self.steps.iter().any(|s| s.name == name) {
            return Err(ConfigurationError::DuplicateStep {
                url: self.url.clone(),
                step: name.to_owned(),
            });
        }
        self.steps.push(Step::new(name, handler));
        Ok(self)
    }

    /// Appends the primary handler under the reserved name `main`.
    pub fn main(self, handler: impl StepFn) -> Result<Self, ConfigurationError> {
        self.step(MAIN_STEP, handler)
    }

    /// Synthesizes a validation step for `target`. On failure the chain
    /// fails with a `Validation` error; on success the normalized data is
    /// available via [`Request::validated`](crate::Request::validated).
    ///
    /// Also registers the validation-error shape as a declared 400 response.
    pub fn validate(
        self,
        target: ValidateTarget,
        schema: impl Into<SchemaRef>,
    ) -> Result<Self, ConfigurationError> {
        let schema_ref: SchemaRef = schema.into();
        let name = format!("validate:{target}");
        let handler = move |ctx: StepCtx, input: Value| {
            let schema_ref = schema_ref.clone();
            async move {
                let data = ctx.request().target_value(target);
                let Some(schema) = schema_ref.resolve(ctx.app()) else {
                    let named = match &schema_ref {
                        SchemaRef::Named(n) => n.as_str(),
                        SchemaRef::Inline(_) => "inline",
                    };
                    return Err(RequestError::internal_note(format!(
                        "validation schema `{named}` is not registered"
                    )));
                };
                let normalized = ctx.app().validator().validate(schema, data).await?;
                ctx.request().set_validated(target, normalized);
                Ok(Flow::Next(input))
            }
        };
        self.step(&name, handler)
            .map(|route| route.responds_with(StatusCode::BAD_REQUEST, validation_error_schema()))
    }

    /// Attaches a (filter, handler) catch pair to the most recently declared
    /// step. Fails if no step has been declared yet.
    pub fn catch(
        mut self,
        filter: ErrorFilter,
        handler: impl CatchFn,
    ) -> Result<Self, ConfigurationError> {
        let Some(step) = self.steps.last_mut() else {
            return Err(ConfigurationError::CatchWithoutStep(self.url.clone()));
        };
        step.catches.push(Catch { filter, handler: std::sync::Arc::new(handler) });
        Ok(self)
    }

    /// Sugar for [`catch`](Route::catch) with the match-all filter.
    pub fn catch_any(self, handler: impl CatchFn) -> Result<Self, ConfigurationError> {
        self.catch(ErrorFilter::any(), handler)
    }

    // ── Response schemas ─────────────────────────────────────────────────────

    /// Declares a response schema for `status`. Status 200 holds at most one
    /// schema — declaring again replaces it. Every other status accumulates
    /// variants (several declared error shapes per status).
    pub fn responds_with(mut self, status: StatusCode, schema: impl Into<SchemaRef>) -> Self {
        let entry = self.responses.entry(status.as_u16()).or_default();
        if status == StatusCode::OK {
            entry.clear();
        }
        entry.push(schema.into());
        self
    }

    // ── Content types ────────────────────────────────────────────────────────

    /// Accepts `mime` request bodies, parsed with `parser`. Idempotent per
    /// type: the first declaration wins.
    pub fn accepts(mut self, mime: &str, parser: BodyParser) -> Self {
        self.content.accept(mime, parser);
        self
    }

    /// Withdraws acceptance of `mime`. Accepting it again later restores it.
    pub fn rejects(mut self, mime: &str) -> Self {
        self.content.reject(mime);
        self
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn method(&self) -> Method { self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }

    /// The computed identifier. Before the owning app's `build()` this is
    /// the URL template.
    pub fn id(&self) -> &str {
        self.compiled.as_ref().map(|c| c.id.as_str()).unwrap_or(&self.url)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Declared response schemas, keyed by status code.
    pub fn responses(&self) -> &BTreeMap<u16, Vec<SchemaRef>> {
        &self.responses
    }

    /// The declared 200 schema, the one responses are filtered through.
    pub fn success_schema(&self) -> Option<&SchemaRef> {
        self.responses.get(&200).and_then(|v| v.first())
    }

    // ── Compilation ──────────────────────────────────────────────────────────

    /// Freezes the route: computes its id, compiles the URL template, and
    /// installs the implicit steps. Called once by the app's `build()`.
    pub(crate) fn compile(&mut self, config: &AppConfig) -> Result<(), ConfigurationError> {
        let id = self.compute_id(&config.route_id_format)?;
        let (matchit_path, constraints) = parse_template(&self.url)?;

        // The one parsing step, at the very front — never on bodyless methods.
        if self.method.carries_body() && !self.content.is_empty() {
            self.steps.insert(0, self.content.parse_step());
        }
        // Terminal no-op, so a declared chain always ends in a known link. A
        // route declared with no steps at all stays empty and fails at call
        // time instead.
        if let Some(last) = self.steps.last() {
            if last.name() != NOOP_STEP {
                self.steps.push(Step::noop());
            }
        }

        self.compiled = Some(Compiled { id, matchit_path, constraints });
        Ok(())
    }

    fn compute_id(&self, format: &str) -> Result<String, ConfigurationError> {
        let resource = self
            .resource
            .clone()
            .unwrap_or_else(|| derive_resource(&self.url));
        let mut id = format
            .replace("{method}", self.method.as_lower())
            .replace("{resource}", &resource);
        if format.contains("{version}") {
            let Some(version) = self.version else {
                return Err(ConfigurationError::MissingVersion(self.url.clone()));
            };
            id = id.replace("{version}", &version.to_string());
        }
        Ok(id)
    }
}

/// The declared shape of validation failures, registered under 400 whenever
/// a route declares a validation step.
fn validation_error_schema() -> Schema {
    Schema::object()
        .prop("error", Schema::string())
        .prop("message", Schema::string())
        .prop(
            "violations",
            Schema::array(
                Schema::object()
                    .prop("field", Schema::string())
                    .prop("message", Schema::string()),
            ),
        )
}

fn derive_resource(url: &str) -> String {
    url.split('/')
        .find(|s| !s.is_empty() && !s.starts_with('{'))
        .unwrap_or("root")
        .to_owned()
}

/// Splits a URL template into the radix-tree path and the per-parameter
/// regex constraints (`{id:[0-9]+}` style).
fn parse_template(url: &str) -> Result<(String, Vec<(String, Regex)>), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    let mut path_segments = Vec::new();
    let mut constraints = Vec::new();
    for segment in url.split('/') {
        if let Some(inner) = segment.strip_prefix('{') {
            let Some(inner) = inner.strip_suffix('}') else {
                return Err(invalid("unterminated `{` in parameter segment"));
            };
            let (name, pattern) = match inner.split_once(':') {
                Some((name, pattern)) => (name, Some(pattern)),
                None => (inner, None),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("parameter names must be alphanumeric"));
            }
            if let Some(pattern) = pattern {
                let anchored = format!("^(?:{pattern})$");
                let regex = Regex::new(&anchored).map_err(|e| ConfigurationError::InvalidUrl {
                    url: url.to_owned(),
                    reason: format!("bad constraint for `{name}`: {e}"),
                })?;
                constraints.push((name.to_owned(), regex));
            }
            path_segments.push(format!("{{{name}}}"));
        } else if segment.contains('{') || segment.contains('}') {
            return Err(invalid("braces are only allowed as whole parameter segments"));
        } else {
            path_segments.push(segment.to_owned());
        }
    }
    Ok((path_segments.join("/"), constraints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parsing_strips_constraints() {
        let (path, constraints) = parse_template("/users/{id:[0-9]+}/posts/{slug}").unwrap();
        assert_eq!(path, "/users/{id}/posts/{slug}");
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].0, "id");
        assert!(constraints[0].1.is_match("42"));
        assert!(!constraints[0].1.is_match("forty-two"));
    }

    #[test]
    fn malformed_templates_fail_declaration() {
        assert!(Route::get("/users/{id").is_err());
        assert!(Route::get("/users/x{y}z").is_err());
        assert!(Route::get("users").is_err());
        assert!(matches!(Route::get(""), Err(ConfigurationError::EmptyUrl)));
    }

    #[test]
    fn resource_defaults_to_first_static_segment() {
        assert_eq!(derive_resource("/users/{id}"), "users");
        assert_eq!(derive_resource("/{id}"), "root");
    }
}

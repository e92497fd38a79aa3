//! Payload schemas: the validation seam and response projection.
//!
//! The framework does not want to be a validation engine. It owns *when*
//! validation runs and how failures become [`RequestError`]s; the engine
//! itself sits behind the [`SchemaValidator`] trait and is injected into the
//! [`App`](crate::App). The bundled [`BasicValidator`] covers required
//! fields, type checks, defaults, and the declared coercions — enough for
//! services that don't bring their own engine.
//!
//! Response *filtering* ([`Schema::filter`]) is a framework concern though:
//! it is the mechanism that guarantees a response body never carries a field
//! the route didn't declare.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RequestError, Violation};
use crate::step::BoxFuture;

// ── Schema model ─────────────────────────────────────────────────────────────

/// The value types a schema node can declare.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

/// One node of a payload schema.
///
/// Deliberately a small JSON-Schema-shaped subset: type, object properties,
/// required names, array items, and a default. Schemas deserialize from JSON,
/// so they can live in configuration as well as in code.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Schema {
    fn typed(ty: SchemaType) -> Self {
        Self { ty: Some(ty), ..Self::default() }
    }

    pub fn string() -> Self  { Self::typed(SchemaType::String) }
    pub fn integer() -> Self { Self::typed(SchemaType::Integer) }
    pub fn number() -> Self  { Self::typed(SchemaType::Number) }
    pub fn boolean() -> Self { Self::typed(SchemaType::Boolean) }
    pub fn object() -> Self  { Self::typed(SchemaType::Object) }

    pub fn array(items: Schema) -> Self {
        Self { items: Some(Box::new(items)), ..Self::typed(SchemaType::Array) }
    }

    /// Declares a property on an object schema. Chainable.
    pub fn prop(mut self, name: &str, schema: Schema) -> Self {
        self.properties.insert(name.to_owned(), schema);
        self
    }

    /// Marks a property as required.
    pub fn require(mut self, name: &str) -> Self {
        self.required.push(name.to_owned());
        self
    }

    /// Declares the default applied when the field is absent.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    // ── Response projection ──────────────────────────────────────────────────

    /// Projects `data` through this schema: undeclared fields are stripped,
    /// defaults fill absent ones, and declared coercions are applied.
    ///
    /// Projection is lenient where validation is strict — a value that cannot
    /// be coerced passes through unchanged rather than failing the response.
    pub fn filter(&self, data: &Value) -> Value {
        match (self.ty, data) {
            (Some(SchemaType::Object) | None, Value::Object(fields)) if !self.properties.is_empty() => {
                let mut out = Map::new();
                for (name, prop) in &self.properties {
                    match fields.get(name) {
                        Some(value) => { out.insert(name.clone(), prop.filter(value)); }
                        None => {
                            if let Some(default) = &prop.default {
                                out.insert(name.clone(), default.clone());
                            }
                        }
                    }
                }
                Value::Object(out)
            }
            (Some(SchemaType::Array), Value::Array(elems)) => match &self.items {
                Some(items) => Value::Array(elems.iter().map(|e| items.filter(e)).collect()),
                None => data.clone(),
            },
            (Some(ty), value) => coerce(ty, value).unwrap_or_else(|| value.clone()),
            (None, value) => value.clone(),
        }
    }
}

/// Attempts the declared coercion of `value` to `ty`.
fn coerce(ty: SchemaType, value: &Value) -> Option<Value> {
    match (ty, value) {
        (SchemaType::String, Value::String(_)) => Some(value.clone()),
        (SchemaType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (SchemaType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (SchemaType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
        (SchemaType::Integer, Value::Number(n)) => {
            let f = n.as_f64()?;
            (f.fract() == 0.0).then(|| Value::from(f as i64))
        }
        (SchemaType::Integer, Value::String(s)) => s.parse::<i64>().ok().map(Value::from),

        (SchemaType::Number, Value::Number(_)) => Some(value.clone()),
        (SchemaType::Number, Value::String(s)) => s.parse::<f64>().ok().map(Value::from),

        (SchemaType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (SchemaType::Boolean, Value::String(s)) => match s.as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (SchemaType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },

        (SchemaType::Object, Value::Object(_)) => Some(value.clone()),
        (SchemaType::Array, Value::Array(_)) => Some(value.clone()),
        _ => None,
    }
}

// ── SchemaRef ────────────────────────────────────────────────────────────────

/// A schema declared inline or by the name it was registered under on the app.
#[derive(Clone, Debug)]
pub enum SchemaRef {
    Inline(Schema),
    Named(String),
}

impl SchemaRef {
    pub(crate) fn resolve<'a>(&'a self, app: &'a crate::App) -> Option<&'a Schema> {
        match self {
            Self::Inline(schema) => Some(schema),
            Self::Named(name) => app.schema(name),
        }
    }
}

impl From<Schema> for SchemaRef {
    fn from(schema: Schema) -> Self { Self::Inline(schema) }
}

impl From<&str> for SchemaRef {
    fn from(name: &str) -> Self { Self::Named(name.to_owned()) }
}

// ── Validator seam ───────────────────────────────────────────────────────────

/// The validation engine the framework orchestrates but does not implement.
///
/// Implementations reject with a [`RequestError`] (normally the `Validation`
/// kind) and resolve with the *normalized* data: defaults applied, declared
/// coercions performed.
pub trait SchemaValidator: Send + Sync + 'static {
    fn validate(&self, schema: &Schema, data: Value) -> BoxFuture<Result<Value, RequestError>>;
}

/// The bundled engine: required fields, type checks with coercion, defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicValidator;

impl SchemaValidator for BasicValidator {
    fn validate(&self, schema: &Schema, data: Value) -> BoxFuture<Result<Value, RequestError>> {
        let mut violations = Vec::new();
        let normalized = check(schema, &data, "", &mut violations);
        let result = if violations.is_empty() {
            Ok(normalized)
        } else {
            Err(RequestError::validation(violations))
        };
        Box::pin(std::future::ready(result))
    }
}

fn violation(violations: &mut Vec<Violation>, path: &str, message: impl Into<String>) {
    let field = if path.is_empty() { "(root)".to_owned() } else { path.to_owned() };
    violations.push(Violation { field, message: message.into() });
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() { name.to_owned() } else { format!("{path}.{name}") }
}

/// Walks `data` against `schema`, collecting violations and returning the
/// normalized value. Unknown fields are preserved: stripping is a response
/// concern, not a request one.
fn check(schema: &Schema, data: &Value, path: &str, violations: &mut Vec<Violation>) -> Value {
    if !schema.properties.is_empty() || schema.ty == Some(SchemaType::Object) {
        let fields = match data {
            Value::Object(fields) => fields.clone(),
            Value::Null => Map::new(),
            other => {
                violation(violations, path, "expected an object");
                return other.clone();
            }
        };
        let mut out = fields.clone();
        for (name, prop) in &schema.properties {
            let prop_path = join(path, name);
            match fields.get(name) {
                Some(value) => {
                    out.insert(name.clone(), check(prop, value, &prop_path, violations));
                }
                None => match &prop.default {
                    Some(default) => { out.insert(name.clone(), default.clone()); }
                    None if schema.required.iter().any(|r| r == name) => {
                        violation(violations, &prop_path, "is required");
                    }
                    None => {}
                },
            }
        }
        return Value::Object(out);
    }

    if schema.ty == Some(SchemaType::Array) {
        let Value::Array(elems) = data else {
            violation(violations, path, "expected an array");
            return data.clone();
        };
        let items = match &schema.items {
            Some(items) => items,
            None => return data.clone(),
        };
        let out = elems
            .iter()
            .enumerate()
            .map(|(i, e)| check(items, e, &join(path, &i.to_string()), violations))
            .collect();
        return Value::Array(out);
    }

    match schema.ty {
        Some(ty) => match coerce(ty, data) {
            Some(value) => value,
            None => {
                violation(violations, path, format!("expected {}", type_name(ty)));
                data.clone()
            }
        },
        None => data.clone(),
    }
}

fn type_name(ty: SchemaType) -> &'static str {
    match ty {
        SchemaType::String  => "a string",
        SchemaType::Integer => "an integer",
        SchemaType::Number  => "a number",
        SchemaType::Boolean => "a boolean",
        SchemaType::Object  => "an object",
        SchemaType::Array   => "an array",
    }
}

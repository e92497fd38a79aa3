//! The per-request reply wrapper and the short-circuit result.
//!
//! A [`Reply`] decorates the response being assembled for exactly one
//! in-flight request. Steps interact with it two ways:
//!
//! - [`filter`](Reply::filter) stages data for schema projection — when the
//!   chain completes, fields the route's declared success schema doesn't
//!   name are stripped, its defaults applied, its coercions performed, and
//!   the result serialized. Undeclared fields cannot leak.
//! - [`Flow::respond`](crate::Flow::respond) builds a [`Respond`] whose
//!   action runs against the reply directly, bypassing the remaining chain —
//!   redirects, custom content types, anything the schema path doesn't fit.

use std::sync::Arc;

use serde_json::Value;

use crate::response::Response;
use crate::route::Route;
use crate::schema::Schema;

// ── Reply ────────────────────────────────────────────────────────────────────

/// Wraps the response for one in-flight request.
pub struct Reply {
    route: Arc<Route>,
    staged: Option<Value>,
    sent: Option<Response>,
}

impl Reply {
    pub(crate) fn new(route: Arc<Route>) -> Self {
        Self { route, staged: None, sent: None }
    }

    /// The route this reply belongs to.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Stages `data` for schema-filtered rendering at chain completion.
    /// Staging again replaces the earlier payload.
    pub fn filter(&mut self, data: Value) {
        self.staged = Some(data);
    }

    /// Sends `response` as the final word for this request. The first send
    /// wins; later attempts are dropped with a warning.
    pub fn send(&mut self, response: Response) {
        if self.sent.is_some() {
            tracing::warn!(route = %self.route.url(), "response already sent, dropping second send");
            return;
        }
        self.sent = Some(response);
    }

    /// Whether a response has been sent.
    pub fn sent(&self) -> bool {
        self.sent.is_some()
    }

    /// Renders the staged payload, if any, through the declared success
    /// schema. No staged payload and nothing sent leaves the reply empty —
    /// the dispatcher's continuation takes over.
    pub(crate) fn render(&mut self, schema: Option<&Schema>) {
        if self.sent.is_some() {
            return;
        }
        let Some(data) = self.staged.take() else { return };
        let body = match schema {
            Some(schema) => schema.filter(&data),
            None => data,
        };
        let bytes = serde_json::to_vec(&body).expect("serializing a JSON value cannot fail");
        self.sent = Some(Response::json(bytes));
    }

    /// Takes the response out, leaving the reply spent.
    pub(crate) fn take(&mut self) -> Option<Response> {
        self.sent.take()
    }
}

// ── Respond ──────────────────────────────────────────────────────────────────

/// The short-circuit result: a render action that terminates the chain.
///
/// Constructed by [`Flow::respond`](crate::Flow::respond), consumed
/// immediately by the executor — never stored.
pub struct Respond {
    action: Box<dyn FnOnce(&mut Reply) + Send>,
}

impl Respond {
    pub(crate) fn new(action: impl FnOnce(&mut Reply) + Send + 'static) -> Self {
        Self { action: Box::new(action) }
    }

    /// Runs the render action. Consumes the result; it cannot run twice.
    pub(crate) fn run(self, reply: &mut Reply) {
        (self.action)(reply);
    }
}

//! The error-normalization protocol.
//!
//! Every failure that escapes a route chain passes through exactly one
//! procedure before a byte of response is written: classification into the
//! [`RequestError`] taxonomy, the origin/correlation stamp, a notification
//! for observability, then rendering. No route-level code can bypass it.
//!
//! Classification is total. Whatever a collaborator hands over — an explicit
//! null, a foreign boxed error, even a bare JSON value that should never
//! have been raised — comes out the other end as a `RequestError`, worst
//! case an internal fault. The defect path logs loudly instead of crashing.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use crate::error::{BoxError, ErrorKind, RequestError};
use crate::response::Response;
use crate::step::{BoxFuture, StepCtx};

// ── Fault ────────────────────────────────────────────────────────────────────

/// An arbitrary failure value handed to the error handler.
pub enum Fault {
    /// A collaborator explicitly passed a null failure. Classified as an
    /// internal fault — null is never a meaningful error.
    Null,
    /// Already part of the taxonomy.
    Request(RequestError),
    /// Some other error type. Routed through the unknown-error hook when one
    /// is registered, coerced to an internal fault otherwise.
    Error(BoxError),
    /// A bare non-error value. A defect in calling code; classified as an
    /// internal fault and logged as such.
    Value(Value),
}

impl From<RequestError> for Fault {
    fn from(error: RequestError) -> Self {
        Self::Request(error)
    }
}

impl From<BoxError> for Fault {
    fn from(error: BoxError) -> Self {
        Self::Error(error)
    }
}

// ── Render listeners ─────────────────────────────────────────────────────────

/// An externally registered error renderer.
///
/// Listeners run in registration order, each awaited before the next.
/// Returning `Ok(Some(response))` sends that response and stops the
/// sequence; `Ok(None)` passes to the next listener. If none sends, the
/// default rendering (the error's JSON wire body) applies.
pub trait RenderFn: Send + Sync + 'static {
    fn call(&self, error: Arc<RequestError>) -> BoxFuture<Result<Option<Response>, BoxError>>;
}

impl<F, Fut> RenderFn for F
where
    F: Fn(Arc<RequestError>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Response>, BoxError>> + Send + 'static,
{
    fn call(&self, error: Arc<RequestError>) -> BoxFuture<Result<Option<Response>, BoxError>> {
        Box::pin(self(error))
    }
}

// ── Classification + rendering ───────────────────────────────────────────────

/// Normalizes, stamps, notifies, renders. The single exit for every failure.
pub(crate) async fn handle(ctx: &StepCtx, fault: Option<Fault>) {
    // No error: control returns to the normal path, nothing is rendered.
    let Some(fault) = fault else { return };

    let app = ctx.app();
    let mut error = app.classify(fault);
    error.stamp(ctx.route().id(), ctx.request().correlation());
    notify(ctx, &error);

    let error = Arc::new(error);
    for listener in app.render_listeners() {
        match listener.call(Arc::clone(&error)).await {
            Ok(Some(response)) => {
                ctx.reply().send(response);
                break;
            }
            Ok(None) => {}
            Err(listener_error) => {
                // Escalate as an event only; earlier listeners' effects
                // stand and the error itself is not re-rendered.
                error!(
                    origin = error.origin().unwrap_or(""),
                    error = %listener_error,
                    "render listener failed"
                );
                break;
            }
        }
    }

    let mut reply = ctx.reply();
    if !reply.sent() {
        reply.send(default_render(&error));
    }
}

/// Emits the observability events for a classified error and fans it out to
/// the registered listeners. Client-facing errors notify at warn; internal
/// faults get the strongest severity.
fn notify(ctx: &StepCtx, error: &RequestError) {
    let correlation = error
        .correlation()
        .map(|c| c.to_string())
        .unwrap_or_default();
    match error.kind() {
        ErrorKind::Internal => error!(
            origin = error.origin().unwrap_or(""),
            correlation = %correlation,
            code = error.code(),
            status = error.status().as_u16(),
            message = error.message(),
            "internal fault"
        ),
        ErrorKind::Client | ErrorKind::Validation => warn!(
            origin = error.origin().unwrap_or(""),
            correlation = %correlation,
            code = error.code(),
            status = error.status().as_u16(),
            "request error"
        ),
    }
    for listener in ctx.app().error_listeners() {
        listener(error);
    }
}

/// The built-in rendering: the error's status and JSON wire body.
pub(crate) fn default_render(error: &RequestError) -> Response {
    let body = serde_json::to_vec(&error.wire_body())
        .expect("serializing a JSON value cannot fail");
    Response::builder().status(error.status()).json(body)
}

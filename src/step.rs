//! Steps: the units of a route's processing chain.
//!
//! # How step handlers are stored
//!
//! A route holds steps of *different* concrete types in one `Vec`, so the
//! typed world is bridged to a trait-object world exactly once, at
//! declaration time:
//!
//! ```text
//! async fn load(ctx: StepCtx, input: Value) -> Result<Flow, RequestError>
//!        ↓ route.step("load", load)
//! Arc<dyn StepFn>            ← blanket impl boxes the concrete future
//!        ↓
//! step.call(ctx, input)      ← one vtable dispatch per step per request
//! ```
//!
//! The per-request cost is one `Arc` clone and one virtual call per step —
//! noise next to the network I/O around it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use http::StatusCode;
use serde_json::Value;

use crate::app::App;
use crate::error::{ErrorKind, RequestError};
use crate::reply::{Reply, Respond};
use crate::request::Request;
use crate::route::Route;

/// A heap-allocated, type-erased future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Flow ─────────────────────────────────────────────────────────────────────

/// What a step hands back to the executor.
///
/// Together with the `Err` side of [`StepResult`] this is the whole outcome
/// space: continue with a value, short-circuit with a render action, or fail.
pub enum Flow {
    /// Feed this value to the next step.
    Next(Value),
    /// Stop the chain now and run this render action. Terminal.
    Respond(Respond),
}

impl Flow {
    /// Continue the chain with `value` as the next step's input.
    pub fn next(value: impl Into<Value>) -> Self {
        Self::Next(value.into())
    }

    /// Continue the chain with nothing of interest to pass along.
    pub fn done() -> Self {
        Self::Next(Value::Null)
    }

    /// Short-circuit: abandon every remaining step and run `action` against
    /// the reply. The action runs exactly once.
    pub fn respond(action: impl FnOnce(&mut Reply) + Send + 'static) -> Self {
        Self::Respond(Respond::new(action))
    }
}

/// The result every step and catch handler resolves to.
pub type StepResult = Result<Flow, RequestError>;

// ── Handler traits ───────────────────────────────────────────────────────────

/// Implemented for every valid step handler.
///
/// Automatically satisfied by any `async fn` (or closure returning a future)
/// with the signature:
///
/// ```text
/// async fn name(ctx: StepCtx, input: Value) -> Result<Flow, RequestError>
/// ```
pub trait StepFn: Send + Sync + 'static {
    fn call(&self, ctx: StepCtx, input: Value) -> BoxFuture<StepResult>;
}

impl<F, Fut> StepFn for F
where
    F: Fn(StepCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn call(&self, ctx: StepCtx, input: Value) -> BoxFuture<StepResult> {
        Box::pin(self(ctx, input))
    }
}

/// Implemented for every valid catch handler: like a step, but its input is
/// the intercepted error instead of the previous step's value.
pub trait CatchFn: Send + Sync + 'static {
    fn call(&self, ctx: StepCtx, error: RequestError) -> BoxFuture<StepResult>;
}

impl<F, Fut> CatchFn for F
where
    F: Fn(StepCtx, RequestError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn call(&self, ctx: StepCtx, error: RequestError) -> BoxFuture<StepResult> {
        Box::pin(self(ctx, error))
    }
}

// ── ErrorFilter ──────────────────────────────────────────────────────────────

/// Selects which errors a catch entry intercepts.
pub struct ErrorFilter(Filter);

enum Filter {
    Any,
    Kind(ErrorKind),
    Code(String),
    Status(StatusCode),
    Pred(Box<dyn Fn(&RequestError) -> bool + Send + Sync>),
}

impl ErrorFilter {
    /// Matches every error. The default when a catch declares no filter.
    pub fn any() -> Self { Self(Filter::Any) }

    /// Matches errors of one taxonomy kind.
    pub fn kind(kind: ErrorKind) -> Self { Self(Filter::Kind(kind)) }

    /// Matches errors carrying this API code.
    pub fn code(code: &str) -> Self { Self(Filter::Code(code.to_owned())) }

    /// Matches errors carrying this HTTP status.
    pub fn status(status: StatusCode) -> Self { Self(Filter::Status(status)) }

    /// Matches errors satisfying an arbitrary predicate.
    pub fn pred(f: impl Fn(&RequestError) -> bool + Send + Sync + 'static) -> Self {
        Self(Filter::Pred(Box::new(f)))
    }

    pub(crate) fn matches(&self, error: &RequestError) -> bool {
        match &self.0 {
            Filter::Any => true,
            Filter::Kind(kind) => error.kind() == *kind,
            Filter::Code(code) => error.code() == code,
            Filter::Status(status) => error.status() == *status,
            Filter::Pred(f) => f(error),
        }
    }
}

// ── Step / Catch ─────────────────────────────────────────────────────────────

/// The reserved name [`Route::main`](crate::Route::main) declares under.
pub const MAIN_STEP: &str = "main";

/// The name of the implicit terminal step appended at build time.
pub(crate) const NOOP_STEP: &str = "noop";

/// One (filter, handler) interception pair attached to a step.
pub(crate) struct Catch {
    pub(crate) filter: ErrorFilter,
    pub(crate) handler: Arc<dyn CatchFn>,
}

/// One named unit of work in a route's chain.
pub struct Step {
    pub(crate) name: String,
    pub(crate) handler: Arc<dyn StepFn>,
    pub(crate) catches: Vec<Catch>,
}

impl Step {
    pub(crate) fn new(name: &str, handler: impl StepFn) -> Self {
        Self {
            name: name.to_owned(),
            handler: Arc::new(handler),
            catches: Vec::new(),
        }
    }

    /// The terminal no-op: passes its input through untouched.
    pub(crate) fn noop() -> Self {
        Self::new(NOOP_STEP, |_ctx: StepCtx, input: Value| async move { Ok(Flow::Next(input)) })
    }

    pub fn name(&self) -> &str { &self.name }
}

// ── StepCtx ──────────────────────────────────────────────────────────────────

struct CtxInner {
    app: Arc<App>,
    route: Arc<Route>,
    request: Request,
    reply: Mutex<Reply>,
}

/// Per-request context handed to every step and catch handler.
///
/// Cheap to clone. The route and app handles are read-only introspection —
/// a step can look up sibling route URLs or registered schemas, never mutate
/// them. The one mutable surface is [`reply`](StepCtx::reply), scoped to this
/// request alone.
#[derive(Clone)]
pub struct StepCtx {
    inner: Arc<CtxInner>,
}

impl StepCtx {
    pub(crate) fn new(app: Arc<App>, route: Arc<Route>, request: Request) -> Self {
        let reply = Reply::new(Arc::clone(&route));
        Self {
            inner: Arc::new(CtxInner { app, route, request, reply: Mutex::new(reply) }),
        }
    }

    /// The application this request is running in.
    pub fn app(&self) -> &App {
        &self.inner.app
    }

    /// The route that owns the executing chain.
    pub fn route(&self) -> &Route {
        &self.inner.route
    }

    /// The in-flight request.
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Locks the reply wrapper for this request.
    ///
    /// Steps run strictly one at a time within a chain, so the lock is
    /// uncontended; it exists so the context can be shared with spawned
    /// sub-work safely. Do not hold the guard across an `.await`.
    pub fn reply(&self) -> MutexGuard<'_, Reply> {
        self.inner.reply.lock().expect("reply lock")
    }
}

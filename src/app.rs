//! The application container.
//!
//! An [`App`] is declared, built, served. Declaration mounts routes and
//! registers the injected collaborators (validator, schemas, error hooks and
//! listeners); [`App::build`] compiles every route exactly once and freezes
//! the registry; after that the app is immutable shared state, safe to hand
//! to every connection task. The lifecycle is an explicit state machine —
//! Setup → Built → Running → Stopped — with callbacks invoked synchronously,
//! in registration order, as each phase is entered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::{ConfigurationError, RequestError};
use crate::fault::{Fault, RenderFn};
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use crate::router::RouteTable;
use crate::schema::{BasicValidator, Schema, SchemaValidator};
use crate::step::StepCtx;
use crate::{executor, fault};

// ── Config ───────────────────────────────────────────────────────────────────

/// Application-level settings.
pub struct AppConfig {
    /// Service name, used in startup logging.
    pub service: String,
    /// Route-id template. `{method}`, `{resource}` and `{version}` tokens
    /// are substituted per route; using `{version}` makes a declared version
    /// mandatory on every route.
    pub route_id_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: "stave".to_owned(),
            route_id_format: "{method}:{resource}".to_owned(),
        }
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// The application lifecycle phases.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Declaring routes and collaborators.
    Setup,
    /// Routes compiled, registry frozen, not yet accepting traffic.
    Built,
    /// Accepting traffic.
    Running,
    /// Drained and done.
    Stopped,
}

fn allowed(from: Phase, to: Phase) -> bool {
    matches!(
        (from, to),
        (Phase::Setup, Phase::Built) | (Phase::Built, Phase::Running) | (Phase::Running, Phase::Stopped)
    )
}

type PhaseCallback = Box<dyn Fn(&App) + Send + Sync>;
type ErrorListener = Box<dyn Fn(&RequestError) + Send + Sync>;
type UnknownErrorHook = Box<dyn Fn(crate::error::BoxError) -> RequestError + Send + Sync>;

// ── App ──────────────────────────────────────────────────────────────────────

/// The service container: configuration, collaborators, and the route
/// registry.
pub struct App {
    config: AppConfig,
    phase: Mutex<Phase>,
    pending: Vec<Route>,
    registry: HashMap<String, Arc<Route>>,
    table: RouteTable,
    schemas: HashMap<String, Schema>,
    validator: Arc<dyn SchemaValidator>,
    unknown_error: Option<UnknownErrorHook>,
    error_listeners: Vec<ErrorListener>,
    render_listeners: Vec<Box<dyn RenderFn>>,
    phase_callbacks: Vec<(Phase, PhaseCallback)>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.registry.len())
            .field("schemas", &self.schemas.len())
            .finish_non_exhaustive()
    }
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            phase: Mutex::new(Phase::Setup),
            pending: Vec::new(),
            registry: HashMap::new(),
            table: RouteTable::default(),
            schemas: HashMap::new(),
            validator: Arc::new(BasicValidator),
            unknown_error: None,
            error_listeners: Vec::new(),
            render_listeners: Vec::new(),
            phase_callbacks: Vec::new(),
        }
    }

    // ── Declaration ──────────────────────────────────────────────────────────

    /// Mounts a declared route. Id collisions surface at [`build`](App::build).
    pub fn mount(mut self, route: Route) -> Self {
        self.pending.push(route);
        self
    }

    /// Registers a named schema, usable anywhere a
    /// [`SchemaRef`](crate::SchemaRef) is accepted.
    pub fn register_schema(mut self, name: &str, schema: Schema) -> Self {
        self.schemas.insert(name.to_owned(), schema);
        self
    }

    /// Replaces the validation engine. Defaults to [`BasicValidator`].
    pub fn with_validator(mut self, validator: impl SchemaValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Registers the hook consulted for errors outside the taxonomy. The
    /// hook returns the original coerced or a replacement [`RequestError`],
    /// which is then classified like any other.
    pub fn on_unknown_error(
        mut self,
        hook: impl Fn(crate::error::BoxError) -> RequestError + Send + Sync + 'static,
    ) -> Self {
        self.unknown_error = Some(Box::new(hook));
        self
    }

    /// Registers a listener notified of every classified request error.
    pub fn on_request_error(
        mut self,
        listener: impl Fn(&RequestError) + Send + Sync + 'static,
    ) -> Self {
        self.error_listeners.push(Box::new(listener));
        self
    }

    /// Registers an error render listener. See [`RenderFn`].
    pub fn on_render(mut self, listener: impl RenderFn) -> Self {
        self.render_listeners.push(Box::new(listener));
        self
    }

    /// Registers a callback invoked when `phase` is entered. Callbacks run
    /// synchronously, in registration order.
    pub fn on_phase(mut self, phase: Phase, callback: impl Fn(&App) + Send + Sync + 'static) -> Self {
        self.phase_callbacks.push((phase, Box::new(callback)));
        self
    }

    // ── Build ────────────────────────────────────────────────────────────────

    /// Compiles every mounted route and freezes the registry.
    ///
    /// Fails on the configuration mistakes only visible at this point:
    /// duplicate computed ids, a missing version where the id template
    /// demands one.
    pub fn build(mut self) -> Result<Arc<Self>, ConfigurationError> {
        for mut route in std::mem::take(&mut self.pending) {
            route.compile(&self.config)?;
            let route = Arc::new(route);
            let id = route.id().to_owned();
            if self.registry.contains_key(&id) {
                return Err(ConfigurationError::DuplicateRoute(id));
            }
            self.table.insert(Arc::clone(&route))?;
            self.registry.insert(id, route);
        }
        self.transition(Phase::Built)?;
        info!(service = %self.config.service, routes = self.registry.len(), "app built");
        Ok(Arc::new(self))
    }

    pub(crate) fn transition(&self, to: Phase) -> Result<(), ConfigurationError> {
        {
            let mut phase = self.phase.lock().expect("phase lock");
            if !allowed(*phase, to) {
                return Err(ConfigurationError::InvalidTransition { from: *phase, to });
            }
            *phase = to;
        }
        for (at, callback) in &self.phase_callbacks {
            if *at == to {
                callback(self);
            }
        }
        Ok(())
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("phase lock")
    }

    /// Looks up a compiled route by id.
    pub fn route(&self, id: &str) -> Option<&Arc<Route>> {
        self.registry.get(id)
    }

    /// The URL template of a sibling route, by id.
    pub fn route_url(&self, id: &str) -> Option<&str> {
        self.registry.get(id).map(|r| r.url())
    }

    /// Iterates the compiled routes.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.registry.values()
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub(crate) fn validator(&self) -> &dyn SchemaValidator {
        self.validator.as_ref()
    }

    pub(crate) fn error_listeners(&self) -> &[ErrorListener] {
        &self.error_listeners
    }

    pub(crate) fn render_listeners(&self) -> &[Box<dyn RenderFn>] {
        &self.render_listeners
    }

    // ── Classification ───────────────────────────────────────────────────────

    /// Totally classifies an arbitrary failure into the taxonomy.
    ///
    /// The loop mirrors the reclassification contract: null and bare values
    /// are wrapped into internal faults and re-run; unknown errors consult
    /// the registered hook, whose output is re-run; a [`RequestError`] is
    /// the fixed point.
    pub fn classify(&self, fault: Fault) -> RequestError {
        let mut fault = fault;
        loop {
            fault = match fault {
                Fault::Request(error) => return error,
                Fault::Null => {
                    Fault::Request(RequestError::internal_note("error handler received a null error"))
                }
                Fault::Error(cause) => match &self.unknown_error {
                    Some(hook) => Fault::Request(hook(cause)),
                    None => Fault::Request(RequestError::internal(cause)),
                },
                Fault::Value(value) => {
                    // Raising a non-error value is a defect in calling code;
                    // classified anyway so nothing ever escapes unhandled.
                    tracing::error!(value = %value, "non-error value raised");
                    Fault::Request(RequestError::internal_note(format!(
                        "non-error value raised: {value}"
                    )))
                }
            };
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Runs one request through the compiled pipeline.
    ///
    /// Returns the response the chain (or the error handler) produced, or
    /// `None` when the pipeline did not terminate the request itself — no
    /// matching route, or a chain that completed without sending. `None` is
    /// the downstream continuation's cue, and the type makes the contract
    /// structural: the continuation cannot run after a response exists.
    pub async fn invoke(self: Arc<Self>, mut request: Request) -> Option<Response> {
        let (route, params) = self.table.lookup(request.method(), request.path())?;
        request.set_params(params);

        let ctx = StepCtx::new(self, route, request);
        let outcome = executor::run(&ctx).await;
        // Uniform exit: Some renders through the protocol, None renders
        // nothing and leaves whatever the chain itself produced.
        fault::handle(&ctx, outcome.err().map(Fault::from)).await;
        ctx.reply().take()
    }
}

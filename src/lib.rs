//! # stave
//!
//! A declarative route-pipeline HTTP framework. You describe each endpoint —
//! method, URL, validation schema, response schema, the named steps that do
//! the work — and stave assembles the running server around it, with one
//! error protocol for everything that can go wrong.
//!
//! ## The contract
//!
//! Three rules hold for every route, always:
//!
//! - **Steps run in order, one at a time.** Each step's value feeds the
//!   next. A step can short-circuit the rest of the chain with
//!   [`Flow::respond`]; a failing step is offered to its own catch handlers
//!   before anything else sees the error.
//! - **Responses never leak.** Data staged with [`Reply::filter`] is
//!   projected through the route's declared success schema before
//!   serialization — undeclared fields are stripped, declared defaults and
//!   coercions applied.
//! - **Errors come out classified.** Whatever escapes a chain — a typed
//!   [`RequestError`], a foreign error, even a bare value — passes through
//!   one total classification procedure, gets stamped with its origin route
//!   and the request's correlation id, is logged, and renders with its
//!   declared status. Internal causes never reach the wire.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::{Value, json};
//! use stave::{App, AppConfig, Flow, Route, Schema, Server, StepCtx};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let get_user = Route::get("/users/{id}")?
//!         .describe("Fetch a user")
//!         .main(|ctx: StepCtx, _input: Value| async move {
//!             let id = ctx.request().param("id").unwrap_or("unknown").to_owned();
//!             ctx.reply().filter(json!({ "id": id, "name": "alice", "password": "x" }));
//!             Ok(Flow::done())
//!         })?
//!         // `password` is not declared, so it can never leave the process.
//!         .responds_with(
//!             http::StatusCode::OK,
//!             Schema::object()
//!                 .prop("id", Schema::string())
//!                 .prop("name", Schema::string()),
//!         );
//!
//!     let app = App::new(AppConfig::default())
//!         .mount(get_user)
//!         .mount(stave::health::liveness())
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## What stays outside
//!
//! TLS, rate limiting, body-size limits, and slow-client protection belong
//! to the proxy in front — the framework does framework things. Schema
//! validation itself sits behind the injected [`SchemaValidator`] seam: the
//! bundled [`BasicValidator`] handles required fields, types, defaults, and
//! coercions, and a heavier engine can be dropped in without touching
//! routes.

mod app;
mod content;
mod error;
mod executor;
mod fault;
mod method;
mod reply;
mod request;
mod response;
mod route;
mod router;
mod schema;
mod server;
mod step;

pub mod health;

pub use app::{App, AppConfig, Phase};
pub use content::BodyParser;
pub use error::{BoxError, ConfigurationError, ErrorKind, RequestError, ServeError, Violation};
pub use fault::{Fault, RenderFn};
pub use method::Method;
pub use reply::{Reply, Respond};
pub use request::{Request, ValidateTarget};
pub use response::{ContentType, Response};
pub use route::Route;
pub use schema::{BasicValidator, Schema, SchemaRef, SchemaType, SchemaValidator};
pub use server::Server;
pub use step::{BoxFuture, CatchFn, ErrorFilter, Flow, MAIN_STEP, Step, StepCtx, StepFn, StepResult};

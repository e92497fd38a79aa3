//! Built-in Kubernetes health-check routes.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from the load balancer. |
//!
//! Both are ordinary routes built through the step API — mount them like any
//! other:
//!
//! ```rust,no_run
//! use stave::{App, AppConfig, health};
//!
//! let app = App::new(AppConfig::default())
//!     .mount(health::liveness())
//!     .mount(health::readiness());
//! ```
//!
//! Replace `readiness` with your own route if the pod must verify dependency
//! health (database connections, downstream services) before taking traffic.

use serde_json::Value;

use crate::response::Response;
use crate::route::Route;
use crate::step::{Flow, StepCtx};

/// Liveness probe: `200 OK`, body `"ok"`.
///
/// If the process can respond to HTTP at all, it is alive — this route
/// intentionally has no dependencies.
pub fn liveness() -> Route {
    Route::get("/healthz")
        .and_then(|r| {
            r.describe("Liveness probe").main(|_ctx: StepCtx, _input: Value| async move {
                Ok(Flow::respond(|reply| reply.send(Response::text("ok"))))
            })
        })
        .expect("static health route")
}

/// Readiness probe (default implementation): `200 OK`, body `"ready"`.
pub fn readiness() -> Route {
    Route::get("/readyz")
        .and_then(|r| {
            r.describe("Readiness probe").main(|_ctx: StepCtx, _input: Value| async move {
                Ok(Flow::respond(|reply| reply.send(Response::text("ready"))))
            })
        })
        .expect("static health route")
}

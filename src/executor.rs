//! The compiled chain runner.
//!
//! One invocation per in-flight request, driving the route's steps strictly
//! in declaration order. Each step's success value feeds the next step. The
//! loop is the whole state machine: running at step *i*, short-circuited by
//! a [`Respond`](crate::reply::Respond), failed with the error that escaped,
//! or complete after the last step.
//!
//! Failure handling is local-first: a failing step's own catch entries are
//! tried in declaration order, and only the first whose filter matches runs.
//! A catch may hand back a replacement flow (the chain continues as if the
//! step had succeeded) or a new failure. Whatever escapes the last step is
//! the caller's problem — in practice, the error handler's.

use serde_json::Value;
use tracing::trace;

use crate::error::RequestError;
use crate::step::{Flow, Step, StepCtx};

/// Runs the chain for the context's route to completion.
///
/// `Ok(())` covers both COMPLETE and SHORT_CIRCUITED — in each case the
/// reply holds whatever response the chain chose to produce (possibly none,
/// which is the dispatcher's cue to fall through). `Err` is a failure that
/// escaped every catch.
pub(crate) async fn run(ctx: &StepCtx) -> Result<(), RequestError> {
    let route = ctx.route();
    if route.steps.is_empty() {
        // Reachable only for a route that declared nothing at all; surfaced
        // at call time, naming the URL.
        return Err(RequestError::not_implemented(route.url()));
    }

    let mut input = Value::Null;
    for step in &route.steps {
        let result = step.handler.call(ctx.clone(), input).await;
        let flow = match result {
            Ok(flow) => flow,
            Err(error) => recover(ctx, step, error).await?,
        };
        input = match flow {
            Flow::Next(value) => value,
            Flow::Respond(respond) => {
                trace!(route = %route.id(), step = %step.name(), "chain short-circuited");
                respond.run(&mut ctx.reply());
                return Ok(());
            }
        };
    }

    // COMPLETE: render anything staged through the declared success schema.
    let schema = route
        .success_schema()
        .and_then(|schema_ref| schema_ref.resolve(ctx.app()));
    ctx.reply().render(schema);
    Ok(())
}

/// Offers `error` to the step's catch entries, first matching filter wins.
async fn recover(ctx: &StepCtx, step: &Step, error: RequestError) -> Result<Flow, RequestError> {
    let matched = step.catches.iter().position(|c| c.filter.matches(&error));
    match matched {
        Some(i) => {
            trace!(
                route = %ctx.route().id(),
                step = %step.name(),
                code = %error.code(),
                "catch intercepted step failure"
            );
            step.catches[i].handler.call(ctx.clone(), error).await
        }
        None => Err(error),
    }
}

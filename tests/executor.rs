//! Chain execution semantics, exercised through the public pipeline.
//!
//! Each test builds a small app, runs one request through `App::invoke`, and
//! asserts on the produced response: step ordering, short-circuiting,
//! per-step catch dispatch, the zero-step failure, and the completion
//! fall-through.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::StatusCode;
use serde_json::{Value, json};
use stave::{
    App, AppConfig, ErrorFilter, Flow, Method, Request, RequestError, Response, Route, Schema,
    StepCtx,
};

fn app_with(route: Route) -> Arc<App> {
    App::new(AppConfig::default()).mount(route).build().expect("app builds")
}

fn body_json(response: &Response) -> Value {
    serde_json::from_slice(response.body()).expect("JSON body")
}

#[tokio::test]
async fn steps_run_in_order_and_feed_each_other() {
    let route = Route::get("/sum")
        .unwrap()
        .step("one", |_ctx: StepCtx, _input: Value| async move { Ok(Flow::next(json!(1))) })
        .unwrap()
        .step("two", |_ctx: StepCtx, input: Value| async move {
            let n = input.as_i64().unwrap_or(0);
            Ok(Flow::next(json!(n + 10)))
        })
        .unwrap()
        .main(|ctx: StepCtx, input: Value| async move {
            ctx.reply().filter(json!({ "total": input }));
            Ok(Flow::done())
        })
        .unwrap();

    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/sum"))
        .await
        .expect("a response");
    assert_eq!(body_json(&response), json!({ "total": 11 }));
}

#[tokio::test]
async fn short_circuit_skips_remaining_steps_and_runs_once() {
    let later_steps = Arc::new(AtomicUsize::new(0));
    let renders = Arc::new(AtomicUsize::new(0));
    let (later, rendered) = (Arc::clone(&later_steps), Arc::clone(&renders));

    let route = Route::get("/early")
        .unwrap()
        .step("first", move |_ctx: StepCtx, _input: Value| {
            let rendered = Arc::clone(&rendered);
            async move {
                Ok(Flow::respond(move |reply| {
                    rendered.fetch_add(1, Ordering::SeqCst);
                    reply.send(Response::redirect(StatusCode::FOUND, "/elsewhere"));
                }))
            }
        })
        .unwrap()
        .step("second", move |_ctx: StepCtx, _input: Value| {
            let later = Arc::clone(&later);
            async move {
                later.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::done())
            }
        })
        .unwrap();

    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/early"))
        .await
        .expect("a response");

    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/elsewhere"));
    assert_eq!(renders.load(Ordering::SeqCst), 1, "render action runs exactly once");
    assert_eq!(later_steps.load(Ordering::SeqCst), 0, "no step after a short-circuit");
}

#[tokio::test]
async fn matching_catch_recovers_and_the_chain_continues() {
    let route = Route::get("/recover")
        .unwrap()
        .step("flaky", |_ctx: StepCtx, _input: Value| async move {
            Err::<Flow, _>(RequestError::client(
                StatusCode::UNPROCESSABLE_ENTITY,
                "TYPE_ERROR",
                "x",
            ))
        })
        .unwrap()
        .catch(ErrorFilter::code("TYPE_ERROR"), |_ctx: StepCtx, _err| async move {
            Ok(Flow::next(json!("recovered")))
        })
        .unwrap()
        .main(|ctx: StepCtx, input: Value| async move {
            // The catch's return value is this step's input.
            ctx.reply().filter(json!({ "input": input }));
            Ok(Flow::done())
        })
        .unwrap();

    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/recover"))
        .await
        .expect("a response");
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(body_json(&response), json!({ "input": "recovered" }));
}

#[tokio::test]
async fn non_matching_catch_lets_the_failure_propagate() {
    let reached_main = Arc::new(AtomicUsize::new(0));
    let reached = Arc::clone(&reached_main);

    let route = Route::get("/strict")
        .unwrap()
        .step("flaky", |_ctx: StepCtx, _input: Value| async move {
            Err::<Flow, _>(RequestError::client(StatusCode::CONFLICT, "CONFLICT", "busy"))
        })
        .unwrap()
        .catch(ErrorFilter::code("TYPE_ERROR"), |_ctx: StepCtx, _err| async move {
            Ok(Flow::done())
        })
        .unwrap()
        .main(move |_ctx: StepCtx, _input: Value| {
            let reached = Arc::clone(&reached);
            async move {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::done())
            }
        })
        .unwrap();

    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/strict"))
        .await
        .expect("a response");
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(body_json(&response)["error"], "CONFLICT");
    assert_eq!(reached_main.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn first_matching_catch_wins() {
    let route = Route::get("/layers")
        .unwrap()
        .step("flaky", |_ctx: StepCtx, _input: Value| async move {
            Err::<Flow, _>(RequestError::client(StatusCode::BAD_REQUEST, "A", "x"))
        })
        .unwrap()
        .catch(ErrorFilter::any(), |ctx: StepCtx, _err| async move {
            ctx.reply().filter(json!({ "handled_by": "first" }));
            Ok(Flow::done())
        })
        .unwrap()
        .catch(ErrorFilter::any(), |ctx: StepCtx, _err| async move {
            ctx.reply().filter(json!({ "handled_by": "second" }));
            Ok(Flow::done())
        })
        .unwrap();

    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/layers"))
        .await
        .expect("a response");
    assert_eq!(body_json(&response), json!({ "handled_by": "first" }));
}

#[tokio::test]
async fn zero_step_route_fails_not_implemented_naming_its_url() {
    let route = Route::get("/ghost").unwrap();
    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/ghost"))
        .await
        .expect("a rendered failure");
    assert_eq!(response.status_code(), StatusCode::NOT_IMPLEMENTED);
    // The URL is observability-only: the wire body stays generic.
    let body = body_json(&response);
    assert_eq!(body["error"], "NOT_IMPLEMENTED");
    assert_eq!(body["message"], "internal server error");
}

#[tokio::test]
async fn completed_chain_with_nothing_staged_falls_through() {
    let route = Route::get("/silent")
        .unwrap()
        .main(|_ctx: StepCtx, _input: Value| async move { Ok(Flow::done()) })
        .unwrap();
    let app = app_with(route);

    assert!(app.clone().invoke(Request::new(Method::Get, "/silent")).await.is_none());
    assert!(app.invoke(Request::new(Method::Get, "/no-such-route")).await.is_none());
}

#[tokio::test]
async fn staged_payload_renders_through_the_success_schema() {
    let route = Route::get("/filtered")
        .unwrap()
        .main(|ctx: StepCtx, _input: Value| async move {
            ctx.reply().filter(json!({ "a": 1, "b": 2 }));
            Ok(Flow::done())
        })
        .unwrap()
        .responds_with(StatusCode::OK, Schema::object().prop("a", Schema::integer()));

    let response = app_with(route)
        .invoke(Request::new(Method::Get, "/filtered"))
        .await
        .expect("a response");
    assert_eq!(body_json(&response), json!({ "a": 1 }));
}

#[tokio::test]
async fn path_param_constraints_gate_the_match() {
    let route = Route::get("/users/{id:[0-9]+}")
        .unwrap()
        .main(|ctx: StepCtx, _input: Value| async move {
            let id = ctx.request().param("id").unwrap_or("").to_owned();
            ctx.reply().filter(json!({ "id": id }));
            Ok(Flow::done())
        })
        .unwrap();
    let app = app_with(route);

    let hit = app
        .clone()
        .invoke(Request::new(Method::Get, "/users/42"))
        .await
        .expect("numeric id matches");
    assert_eq!(body_json(&hit), json!({ "id": "42" }));

    assert!(
        app.invoke(Request::new(Method::Get, "/users/alice")).await.is_none(),
        "constraint miss falls through to not-found"
    );
}

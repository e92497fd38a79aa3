//! The error-normalization protocol, end to end.
//!
//! Classification totality (null, foreign errors, bare values), the
//! unknown-error hook, origin/correlation stamping, notification listeners,
//! render-listener ordering and short-circuiting, and what the wire is —
//! and is not — allowed to carry.

use std::sync::{Arc, Mutex};

use http::StatusCode;
use serde_json::{Value, json};
use stave::{
    App, AppConfig, ErrorKind, Fault, Flow, Method, Request, RequestError, Response, Route,
    StepCtx,
};

fn failing_route(status: StatusCode, code: &'static str) -> Route {
    Route::get("/fail")
        .unwrap()
        .main(move |_ctx: StepCtx, _input: Value| async move {
            Err::<Flow, _>(RequestError::client(status, code, "declared failure"))
        })
        .unwrap()
}

fn body_json(response: &Response) -> Value {
    serde_json::from_slice(response.body()).expect("JSON body")
}

// ── Classification totality ──────────────────────────────────────────────────

#[test]
fn null_classifies_as_an_internal_fault() {
    let app = App::new(AppConfig::default());
    let error = app.classify(Fault::Null);
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error.message().contains("null"));
}

#[test]
fn bare_values_classify_without_crashing() {
    let app = App::new(AppConfig::default());
    let error = app.classify(Fault::Value(json!([1, 2, 3])));
    assert_eq!(error.kind(), ErrorKind::Internal);
}

#[test]
fn foreign_errors_coerce_to_internal_without_a_hook() {
    let app = App::new(AppConfig::default());
    let error = app.classify(Fault::Error(std::io::Error::other("disk on fire").into()));
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(error.wire_body()["message"], "internal server error");
}

#[test]
fn the_unknown_error_hook_may_reclassify() {
    let app = App::new(AppConfig::default()).on_unknown_error(|_cause| {
        RequestError::client(StatusCode::TOO_MANY_REQUESTS, "UPSTREAM_BUSY", "try later")
    });
    let error = app.classify(Fault::Error("connection refused".into()));
    assert_eq!(error.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error.code(), "UPSTREAM_BUSY");
}

// ── Rendering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn client_errors_render_their_own_status_and_code() {
    let app = App::new(AppConfig::default())
        .mount(failing_route(StatusCode::FORBIDDEN, "NO_ENTRY"))
        .build()
        .unwrap();
    let response = app
        .invoke(Request::new(Method::Get, "/fail"))
        .await
        .expect("rendered error");
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body = body_json(&response);
    assert_eq!(body["error"], "NO_ENTRY");
    assert_eq!(body["message"], "declared failure");
}

#[tokio::test]
async fn internal_detail_never_reaches_the_wire() {
    let route = Route::get("/fail")
        .unwrap()
        .main(|_ctx: StepCtx, _input: Value| async move {
            Err::<Flow, _>(RequestError::internal(std::io::Error::other(
                "postgres://admin:hunter2@db/prod",
            )))
        })
        .unwrap();
    let app = App::new(AppConfig::default()).mount(route).build().unwrap();
    let response = app
        .invoke(Request::new(Method::Get, "/fail"))
        .await
        .expect("rendered error");
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!String::from_utf8_lossy(response.body()).contains("hunter2"));
}

#[tokio::test]
async fn errors_are_stamped_with_origin_and_correlation_exactly_once() {
    let seen: Arc<Mutex<Vec<(Option<String>, Option<uuid::Uuid>)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let app = App::new(AppConfig::default())
        .on_request_error(move |error| {
            sink.lock().unwrap().push((
                error.origin().map(str::to_owned),
                error.correlation(),
            ));
        })
        .mount(failing_route(StatusCode::IM_A_TEAPOT, "TEAPOT"))
        .build()
        .unwrap();

    app.invoke(Request::new(Method::Get, "/fail")).await.expect("rendered");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (origin, correlation) = &seen[0];
    assert_eq!(origin.as_deref(), Some("get:fail"));
    assert!(correlation.is_some());
}

#[tokio::test]
async fn notification_listener_fires_for_every_classified_error() {
    let codes: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    let app = App::new(AppConfig::default())
        .on_request_error(move |error| sink.lock().unwrap().push(error.code().to_owned()))
        .mount(failing_route(StatusCode::NOT_FOUND, "NOT_FOUND"))
        .build()
        .unwrap();

    app.invoke(Request::new(Method::Get, "/fail")).await.expect("rendered");
    assert_eq!(*codes.lock().unwrap(), vec!["NOT_FOUND".to_owned()]);
}

#[tokio::test]
async fn zero_step_failures_carry_the_url_in_the_notification() {
    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let app = App::new(AppConfig::default())
        .on_request_error(move |error| sink.lock().unwrap().push(error.message().to_owned()))
        .mount(Route::get("/ghost").unwrap())
        .build()
        .unwrap();

    app.invoke(Request::new(Method::Get, "/ghost")).await.expect("rendered");
    let messages = messages.lock().unwrap();
    assert!(messages[0].contains("/ghost"), "not-implemented names the URL: {}", messages[0]);
}

// ── Render listeners ─────────────────────────────────────────────────────────

#[tokio::test]
async fn render_listeners_run_in_order_and_may_short_circuit() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let (first, second, third) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));

    let app = App::new(AppConfig::default())
        .on_render(move |_error: Arc<RequestError>| {
            let order = Arc::clone(&first);
            async move {
                order.lock().unwrap().push("first");
                Ok(None) // pass
            }
        })
        .on_render(move |error: Arc<RequestError>| {
            let order = Arc::clone(&second);
            async move {
                order.lock().unwrap().push("second");
                Ok(Some(
                    Response::builder()
                        .status(error.status())
                        .text(format!("custom: {}", error.code())),
                ))
            }
        })
        .on_render(move |_error: Arc<RequestError>| {
            let order = Arc::clone(&third);
            async move {
                order.lock().unwrap().push("never");
                Ok(None)
            }
        })
        .mount(failing_route(StatusCode::GONE, "GONE"))
        .build()
        .unwrap();

    let response = app
        .invoke(Request::new(Method::Get, "/fail"))
        .await
        .expect("rendered");
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(response.status_code(), StatusCode::GONE);
    assert_eq!(response.body(), b"custom: GONE");
}

#[tokio::test]
async fn failing_render_listener_still_yields_the_default_rendering() {
    let app = App::new(AppConfig::default())
        .on_render(|_error: Arc<RequestError>| async move {
            Err::<Option<Response>, _>("renderer exploded".into())
        })
        .mount(failing_route(StatusCode::CONFLICT, "CONFLICT"))
        .build()
        .unwrap();

    let response = app
        .invoke(Request::new(Method::Get, "/fail"))
        .await
        .expect("rendered");
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(body_json(&response)["error"], "CONFLICT");
}

//! Declaration-time contracts of the route builder.
//!
//! Everything here fails (or must not fail) synchronously, before a server
//! ever starts: bad methods, duplicate step names, catches with nothing to
//! attach to, response-schema replacement rules, content-type bookkeeping,
//! and route-id derivation.

use http::StatusCode;
use serde_json::Value;
use stave::{
    App, AppConfig, BodyParser, ConfigurationError, ErrorFilter, Flow, Method, Route, Schema,
    StepCtx,
};

fn noop_main(route: Route) -> Route {
    route
        .main(|_ctx: StepCtx, _input: Value| async move { Ok(Flow::done()) })
        .expect("main step")
}

#[test]
fn unknown_method_fails_naming_the_value() {
    let err = Route::with_method_str("BREW", "/coffee").unwrap_err();
    assert!(matches!(err, ConfigurationError::UnsupportedMethod(ref m) if m == "BREW"));
}

#[test]
fn empty_url_fails() {
    assert!(matches!(
        Route::new(Method::Get, ""),
        Err(ConfigurationError::EmptyUrl)
    ));
}

#[test]
fn duplicate_step_names_are_rejected() {
    let route = Route::get("/things")
        .unwrap()
        .step("load", |_ctx: StepCtx, _input: Value| async move { Ok(Flow::done()) })
        .unwrap();
    let err = route
        .step("load", |_ctx: StepCtx, _input: Value| async move { Ok(Flow::done()) })
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::DuplicateStep { ref step, .. } if step == "load"
    ));
}

#[test]
fn catch_without_a_preceding_step_is_rejected() {
    let err = Route::get("/things")
        .unwrap()
        .catch(ErrorFilter::any(), |_ctx: StepCtx, err| async move { Err(err) })
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::CatchWithoutStep(_)));
}

#[test]
fn status_200_schema_replaces_while_others_accumulate() {
    let route = Route::get("/things")
        .unwrap()
        .responds_with(StatusCode::OK, Schema::object().prop("a", Schema::string()))
        .responds_with(StatusCode::OK, Schema::object().prop("b", Schema::string()))
        .responds_with(StatusCode::BAD_REQUEST, Schema::object().prop("error", Schema::string()))
        .responds_with(StatusCode::BAD_REQUEST, Schema::object().prop("detail", Schema::string()));

    assert_eq!(route.responses()[&200].len(), 1);
    assert_eq!(route.responses()[&400].len(), 2);
}

#[test]
fn duplicate_route_ids_fail_at_build() {
    // Different URLs, same derived (method, resource) pair.
    let a = noop_main(Route::get("/users").unwrap());
    let b = noop_main(Route::get("/users/{id}").unwrap());
    let err = App::new(AppConfig::default())
        .mount(a)
        .mount(b)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateRoute(ref id) if id == "get:users"));
}

#[test]
fn version_token_in_id_template_requires_a_declared_version() {
    let config = AppConfig {
        route_id_format: "{method}:{resource}:v{version}".to_owned(),
        ..AppConfig::default()
    };
    let err = App::new(config)
        .mount(noop_main(Route::get("/users").unwrap()))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingVersion(_)));

    let config = AppConfig {
        route_id_format: "{method}:{resource}:v{version}".to_owned(),
        ..AppConfig::default()
    };
    let app = App::new(config)
        .mount(noop_main(Route::get("/users").unwrap().version(2)))
        .build()
        .unwrap();
    assert!(app.route("get:users:v2").is_some());
}

#[test]
fn get_routes_never_get_a_body_parsing_step() {
    let app = App::new(AppConfig::default())
        .mount(noop_main(
            Route::get("/things").unwrap().accepts("application/json", BodyParser::Json),
        ))
        .build()
        .unwrap();
    let route = app.route("get:things").unwrap();
    assert_eq!(route.step_names(), vec!["main", "noop"]);
}

#[test]
fn body_methods_get_exactly_one_parsing_step_in_front() {
    let app = App::new(AppConfig::default())
        .mount(noop_main(
            Route::post("/things")
                .unwrap()
                .accepts("application/json", BodyParser::Json)
                .accepts("text/plain", BodyParser::Text),
        ))
        .build()
        .unwrap();
    let route = app.route("post:things").unwrap();
    assert_eq!(route.step_names(), vec!["content", "main", "noop"]);
}

#[test]
fn rejected_content_type_removes_the_parsing_step() {
    let app = App::new(AppConfig::default())
        .mount(noop_main(
            Route::post("/things")
                .unwrap()
                .accepts("application/json", BodyParser::Json)
                .rejects("application/json"),
        ))
        .build()
        .unwrap();
    let route = app.route("post:things").unwrap();
    assert_eq!(route.step_names(), vec!["main", "noop"]);
}

#[test]
fn build_appends_the_terminal_noop_once() {
    let app = App::new(AppConfig::default())
        .mount(noop_main(Route::get("/things").unwrap()))
        .build()
        .unwrap();
    let names = app.route("get:things").unwrap().step_names();
    assert_eq!(names.iter().filter(|n| **n == "noop").count(), 1);
    assert_eq!(names.last(), Some(&"noop"));
}

#[test]
fn sibling_route_urls_are_visible_through_the_app() {
    let app = App::new(AppConfig::default())
        .mount(noop_main(Route::get("/users/{id}").unwrap()))
        .mount(noop_main(Route::delete("/users/{id}").unwrap()))
        .build()
        .unwrap();
    assert_eq!(app.route_url("delete:users"), Some("/users/{id}"));
    assert_eq!(app.route_url("get:users"), Some("/users/{id}"));
    assert_eq!(app.route_url("put:users"), None);
}

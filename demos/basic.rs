//! Minimal stave example — validated CRUD-style JSON endpoints.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{}'                                   # 400 with violations
//!   curl http://localhost:3000/healthz

use http::StatusCode;
use serde_json::{Value, json};
use stave::{
    App, AppConfig, BodyParser, ConfigurationError, Flow, Route, Schema, Server, StepCtx,
    ValidateTarget, health,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = App::new(AppConfig::default())
        .register_schema(
            "user",
            Schema::object()
                .prop("id", Schema::string())
                .prop("name", Schema::string()),
        )
        .mount(get_user().expect("get_user route"))
        .mount(create_user().expect("create_user route"))
        .mount(health::liveness())
        .mount(health::readiness())
        .build()
        .expect("app configuration");

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /users/{id}
//
// The staged payload is filtered through the registered `user` schema, so
// the `password` field below never reaches the wire.
fn get_user() -> Result<Route, ConfigurationError> {
    Ok(Route::get("/users/{id:[0-9]+}")?
        .describe("Fetch a user")
        .main(|ctx: StepCtx, _input: Value| async move {
            let id = ctx.request().param("id").unwrap_or("unknown").to_owned();
            ctx.reply().filter(json!({ "id": id, "name": "alice", "password": "s3cret" }));
            Ok(Flow::done())
        })?
        .responds_with(StatusCode::OK, "user"))
}

// POST /users
//
// The content step parses the JSON body, the validation step enforces the
// inline schema, and `main` reads the normalized result.
fn create_user() -> Result<Route, ConfigurationError> {
    Ok(Route::post("/users")?
        .describe("Create a user")
        .accepts("application/json", BodyParser::Json)
        .validate(
            ValidateTarget::Body,
            Schema::object()
                .prop("name", Schema::string())
                .prop("notify", Schema::boolean().default_value(false))
                .require("name"),
        )?
        .main(|ctx: StepCtx, _input: Value| async move {
            let body = ctx
                .request()
                .validated(ValidateTarget::Body)
                .cloned()
                .unwrap_or(Value::Null);
            Ok(Flow::respond(move |reply| {
                let created = json!({ "id": "99", "name": body["name"] });
                reply.send(
                    stave::Response::builder()
                        .status(StatusCode::CREATED)
                        .header("location", "/users/99")
                        .json(serde_json::to_vec(&created).expect("static json")),
                );
            }))
        })?
        .responds_with(StatusCode::OK, "user"))
}

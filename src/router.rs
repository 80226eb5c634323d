use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info_span, Level};

use crate::{
    api::{
        error_handler::{error_handler, handle_panic},
        health_checks::{self, HEALTH_PATH},
    },
    app::App,
    module::Module,
    rate_limiting::rate_limit_middleware,
    security::{cors_layer, with_security_headers},
};

/// Builds the complete service router: built-in endpoints, module routes and
/// the middleware stack.
pub fn router(app: App, modules: &[Module]) -> Router {
    let mut router = Router::new()
        .route("/", get(health_checks::root))
        .route(HEALTH_PATH, get(health_checks::health))
        .with_state(app.clone());

    for module in modules {
        debug!(module = module.name, path = module.path, "Mounting module");
        let module_router = (module.routes)(app.clone());
        router = if module.is_root() {
            router.merge(module_router)
        } else {
            router.nest(module.path, module_router)
        };
    }

    router = router
        .fallback(health_checks::not_found)
        .method_not_allowed_fallback(health_checks::not_found)
        .layer(DefaultBodyLimit::max(app.config.http.body_limit_bytes));

    if app.config.rate_limiting.enabled {
        router = router.layer(from_fn_with_state(
            app.rate_limit_state.clone(),
            rate_limit_middleware,
        ));
    }

    router = router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn_with_state(app.environment, error_handler))
        .layer(cors_layer(&app.config.cors));

    with_security_headers(router)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default();

                    info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::get, Router};
    use sea_orm::DbErr;
    use serde_json::{json, Value};

    use crate::{
        api::ApiError,
        app::App,
        environment::Environment,
        module::Module,
        tests::{setup_test, setup_test_with},
    };

    async fn failing_handler() -> Result<(), ApiError> {
        Err(ApiError::Database(DbErr::Custom(
            "relation \"secrets\" does not exist".to_string(),
        )))
    }

    async fn panicking_handler() -> &'static str {
        panic!("handler exploded")
    }

    fn failing_routes(app: App) -> Router {
        Router::new()
            .route("/fail", get(failing_handler))
            .route("/panic", get(panicking_handler))
            .with_state(app)
    }

    fn failing_module() -> Module {
        Module::new("failing", "/", failing_routes)
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let test = setup_test(vec![]).await;

        let response = test.server.get("/").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["service"], json!("test-service"));
        assert_eq!(body["data"]["environment"], json!("test"));
    }

    #[tokio::test]
    async fn health_reports_connected_database() {
        let test = setup_test(vec![]).await;

        let response = test.server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["status"], json!("healthy"));
        assert_eq!(body["data"]["database"], json!("connected"));
        assert!(body["data"]["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn health_fails_when_database_is_gone() {
        let test = setup_test(vec![]).await;
        test.app.db.clone().close().await.unwrap();

        let response = test.server.get("/health").await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Database connection failed"));
    }

    #[tokio::test]
    async fn unknown_routes_return_a_404_envelope() {
        let test = setup_test(vec![]).await;

        let response = test.server.get("/nope").await;

        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Route GET /nope not found"));
    }

    #[tokio::test]
    async fn responses_carry_security_and_request_id_headers() {
        let test = setup_test(vec![]).await;

        let response = test.server.get("/").await;

        assert_eq!(response.header("x-content-type-options"), "nosniff");
        assert_eq!(response.header("x-frame-options"), "SAMEORIGIN");
        assert_eq!(response.header("referrer-policy"), "no-referrer");
        assert!(!response.header("x-request-id").is_empty());
    }

    #[tokio::test]
    async fn incoming_request_ids_are_echoed() {
        let test = setup_test(vec![]).await;

        let response = test
            .server
            .get("/")
            .add_header("x-request-id", "req-123")
            .await;

        assert_eq!(response.header("x-request-id"), "req-123");
    }

    #[tokio::test]
    async fn allows_configured_cors_origins_only() {
        let test = setup_test_with(
            vec![],
            Environment::Test,
            &[("CORS_ORIGINS", "http://app.test,http://admin.test")],
        )
        .await;

        let allowed = test
            .server
            .get("/")
            .add_header("origin", "http://admin.test")
            .await;
        assert_eq!(
            allowed.header("access-control-allow-origin"),
            "http://admin.test"
        );

        let denied = test
            .server
            .get("/")
            .add_header("origin", "http://evil.test")
            .await;
        assert!(denied
            .maybe_header("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn rate_limits_clients_by_forwarded_address() {
        let test = setup_test_with(
            vec![],
            Environment::Test,
            &[("RATE_LIMIT_MAX_REQUESTS", "2"), ("TRUST_PROXY", "true")],
        )
        .await;

        for remaining in ["1", "0"] {
            let response = test
                .server
                .get("/")
                .add_header("x-forwarded-for", "203.0.113.7")
                .await;
            response.assert_status_ok();
            assert_eq!(response.header("ratelimit-remaining"), remaining);
        }

        let limited = test
            .server
            .get("/")
            .add_header("x-forwarded-for", "203.0.113.7")
            .await;
        limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert!(!limited.header("retry-after").is_empty());
        let body: Value = limited.json();
        assert_eq!(
            body["error"],
            json!("Too many requests, please try again later.")
        );

        test.server
            .get("/")
            .add_header("x-forwarded-for", "198.51.100.1")
            .await
            .assert_status_ok();

        test.server
            .get("/health")
            .add_header("x-forwarded-for", "203.0.113.7")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn server_errors_are_explained_outside_production() {
        let test = setup_test(vec![failing_module()]).await;

        let response = test.server.get("/fail").await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("secrets"));
        assert!(body["details"]["causes"].is_array());
    }

    #[tokio::test]
    async fn server_errors_are_masked_in_production() {
        let test = setup_test_with(vec![failing_module()], Environment::Production, &[]).await;

        let response = test.server.get("/fail").await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], json!("Internal server error"));
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn panics_become_500_envelopes() {
        let test = setup_test_with(vec![failing_module()], Environment::Production, &[]).await;

        let response = test.server.get("/panic").await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Internal server error"));
    }

    #[tokio::test]
    async fn wrong_methods_return_an_envelope() {
        let test = setup_test(vec![crate::example::module()]).await;

        let response = test.server.post("/health").await;

        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Route POST /health not found"));

        let response = test.server.delete(crate::example::PATH).await;

        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(
            body["error"],
            json!(format!("Route DELETE {} not found", crate::example::PATH))
        );
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_with_413() {
        let test = setup_test_with(
            vec![crate::example::module()],
            Environment::Test,
            &[("BODY_LIMIT_BYTES", "64")],
        )
        .await;

        let response = test
            .server
            .post(crate::example::PATH)
            .json(&json!({ "name": "x".repeat(200) }))
            .await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].is_string());
    }
}

#[allow(unused_imports)]
use crate::vigil::handlers::{
    captcha, captcha::__path_captcha, health, health::__path_health, login, login::__path_login,
    status, status::__path_account_status, status::__path_defense_status,
    status::__path_rate_limit_status, unlock, unlock::__path_unlock,
};
use crate::defense::{
    AlarmSink, AttemptStore, CredentialVerifier, DefenseConfig, DefenseSet, Orchestrator, Reaper,
};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod handlers;
pub mod users;

/// The credential store the engine consults; an external collaborator.
pub type SharedVerifier = Arc<dyn CredentialVerifier>;

#[derive(OpenApi)]
#[openapi(
    paths(
        login,
        captcha,
        rate_limit_status,
        account_status,
        defense_status,
        unlock,
        health
    ),
    components(
        schemas(handlers::login::LoginRequest, handlers::unlock::UnlockRequest)
    ),
    tags(
        (name = "vigil", description = "Adaptive login defense API"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router around an orchestrator and a verifier.
#[must_use]
pub fn router(orchestrator: Arc<Orchestrator>, verifier: SharedVerifier) -> Router {
    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the resource
        .allow_methods([Method::GET, Method::POST])
        // allow requests from any origin
        .allow_origin(Any);

    Router::new()
        .route("/login", post(handlers::login))
        .route("/captcha", get(handlers::captcha))
        .route("/status/rate-limit", get(handlers::rate_limit_status))
        .route("/status/account/:username", get(handlers::account_status))
        .route("/status/defense", get(handlers::defense_status))
        .route("/unlock", post(handlers::unlock))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(orchestrator))
                .layer(Extension(verifier)),
        )
        .route("/health", get(handlers::health).options(handlers::health))
}

/// Wire up the engine and serve it.
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(
    port: u16,
    defenses: DefenseSet,
    cfg: DefenseConfig,
    verifier: SharedVerifier,
    sinks: Vec<Arc<dyn AlarmSink>>,
) -> Result<()> {
    let store = Arc::new(AttemptStore::new());
    let orchestrator = Arc::new(Orchestrator::new(&cfg, defenses, Arc::clone(&store), sinks));

    let reaper = Reaper::new(&cfg, store).with_anomaly(orchestrator.anomaly());
    let reaper_task = reaper.spawn();

    let app = router(orchestrator, verifier);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    reaper_task.abort();

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = openapi();
        let paths = doc.paths.paths;
        assert!(paths.contains_key("/login"));
        assert!(paths.contains_key("/captcha"));
        assert!(paths.contains_key("/status/rate-limit"));
        assert!(paths.contains_key("/status/account/{username}"));
        assert!(paths.contains_key("/status/defense"));
        assert!(paths.contains_key("/unlock"));
        assert!(paths.contains_key("/health"));
    }
}

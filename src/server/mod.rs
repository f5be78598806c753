pub mod handlers;
pub mod previsao;
pub mod state;

use std::net::SocketAddr;

use axum::{
    http::{request::Parts, HeaderValue, Method},
    routing::get,
    Router,
};
use hyper::Server;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub use state::AppState;

/// True when `origin` is allowed by one of `allowed`. An entry of the form
/// `https://*.example.app` accepts any subdomain of `example.app` over the
/// same scheme.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|entry| {
        if entry == "*" || entry == origin {
            return true;
        }
        match entry.split_once("://*.") {
            Some((scheme, domain)) => origin
                .strip_prefix(scheme)
                .and_then(|rest| rest.strip_prefix("://"))
                .and_then(|host| host.strip_suffix(domain))
                .is_some_and(|sub| sub.len() > 1 && sub.ends_with('.')),
            None => false,
        }
    })
}

fn cors_layer(origins: Vec<String>) -> CorsLayer {
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
        origin
            .to_str()
            .map(|o| origin_allowed(o, &origins))
            .unwrap_or(false)
    });
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Build the router with every read-only endpoint.
pub fn create_server(state: AppState, cors_origins: Vec<String>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/source", get(handlers::source))
        .route("/normalize", get(handlers::normalize))
        .route("/mappings", get(handlers::mappings))
        .route("/overview", get(handlers::overview))
        .route("/timeseries", get(handlers::timeseries))
        .route("/ranking/ufs", get(handlers::ranking_ufs))
        .route("/forecast", get(handlers::forecast))
        .route("/api/previsao", get(previsao::previsao))
        .route("/api/previsao/comparacao", get(previsao::comparacao))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors_layer(cors_origins)))
}

/// Serve on `0.0.0.0:<port>` until Ctrl-C.
pub async fn start_server(
    state: AppState,
    port: u16,
    cors_origins: Vec<String>,
) -> Result<(), hyper::Error> {
    let app = create_server(state, cors_origins);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP server running on http://localhost:{}", port);
    info!("Health check: http://localhost:{}/health", port);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down HTTP server");
        })
        .await
}

//! REST surface collaborator boundary (spec.md §1/§6): out of scope to implement in full, but
//! its contract is represented here as a thin stub router so the composition root has
//! something real to bind `PORT` to. `/public/ping`, `/health`, `/` are unauthenticated;
//! everything under `/api/**` requires the `X-Access-Password` header to match
//! [`Config::access_password`] and otherwise returns 501 — trading/account routes, venue REST
//! adapters, and auth middleware proper remain external collaborators per SPEC_FULL.md §4.

use crate::config::Config;
use crate::pool::PoolHealthSnapshot;
use crate::store::Store;
use crate::venue::Venue;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    access_password: Option<Arc<str>>,
}

pub fn router(config: &Config, store: Arc<Store>) -> Router {
    let state = AppState { store, access_password: config.access_password.clone().map(Into::into) };

    Router::new()
        .route("/public/ping", get(ping))
        .route("/health", get(health))
        .route("/", get(root))
        .nest("/api", api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong"
}

async fn root() -> &'static str {
    "venue-sync"
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    pools: Vec<PoolHealthSnapshot>,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let pools = Venue::ALL.into_iter().filter_map(|v| state.store.get_pool_health(v)).collect();
    Json(HealthBody { status: "ok", pools })
}

fn api_router() -> Router<AppState> {
    Router::new().fallback(authenticated_stub)
}

/// Every authenticated route beyond the debug surface is an external collaborator (venue REST
/// adapters, trading, account balance) per spec.md §1 — represented only by its auth contract.
async fn authenticated_stub(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match &state.access_password {
        Some(expected) => {
            let supplied = headers.get("X-Access-Password").and_then(|v| v.to_str().ok());
            if supplied != Some(expected.as_ref()) {
                return (StatusCode::UNAUTHORIZED, "missing or invalid X-Access-Password").into_response();
            }
        }
        None => return (StatusCode::UNAUTHORIZED, "ACCESS_PASSWORD not configured").into_response(),
    }
    (StatusCode::NOT_IMPLEMENTED, "out of scope: see spec.md §1 collaborator surface").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CountingConsumer, Pipeline};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_store() -> Arc<Store> {
        Arc::new(Store::new(Arc::new(Pipeline::new(Arc::new(CountingConsumer::default())))))
    }

    #[tokio::test]
    async fn ping_is_unauthenticated() {
        let config = Config { port: 0, app_url: None, access_password: None, symbols: vec![] };
        let app = router(&config, test_store());
        let response = app.oneshot(Request::builder().uri("/public/ping").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_without_password_header_is_rejected() {
        let config = Config { port: 0, app_url: None, access_password: Some("secret".into()), symbols: vec![] };
        let app = router(&config, test_store());
        let response = app.oneshot(Request::builder().uri("/api/trade/order").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn api_with_correct_password_reaches_the_not_implemented_stub() {
        let config = Config { port: 0, app_url: None, access_password: Some("secret".into()), symbols: vec![] };
        let app = router(&config, test_store());
        let response = app
            .oneshot(Request::builder().uri("/api/trade/order").header("X-Access-Password", "secret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}

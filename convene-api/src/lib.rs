use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod events;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod rsvps;
pub mod state;

pub use state::{AppState, AuthConfig};

use convene_store::redis_repo::rate_limit_key;
use middleware::require_auth;

pub fn app(state: AppState) -> Router {
    let auth = from_fn_with_state(state.clone(), require_auth);

    let events = Router::new()
        .route("/api/events", post(events::create_event).route_layer(auth.clone()))
        .route(
            "/api/events/{id}",
            get(events::get_event).merge(
                put(events::update_event)
                    .delete(events::delete_event)
                    .route_layer(auth.clone()),
            ),
        )
        .route("/api/events/user/my-events", get(events::my_events).route_layer(auth.clone()))
        .route("/api/events/user/attending", get(events::attending_events).route_layer(auth.clone()));

    Router::new()
        .route("/api/health", get(health::health))
        .merge(events)
        .merge(rsvps::routes().route_layer(auth))
        .layer(cors_layer(state.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(_)) => {
            tracing::warn!("Ignoring invalid CORS origin, allowing any");
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    // Absent when the router is driven without a socket, e.g. in tests.
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().cloned() else {
        return next.run(req).await;
    };

    let key = rate_limit_key(&addr.ip().to_string());
    let limits = &state.rate_limit;
    match redis.check_rate_limit(&key, limits.max_requests, limits.window_seconds).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "code": "RATE_LIMITED",
                "message": "Too many requests from this IP, please try again later",
                "retryable": true,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, failing open: {}", e);
            next.run(req).await
        }
    }
}

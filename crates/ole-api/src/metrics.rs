//! Prometheus metrics for the login flow.
//!
//! HTTP traffic is labelled by route template, login/logout outcomes by
//! client registration, and nonce events by lifecycle step.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    // Token exchanges call out to the provider, hence the long tail
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()?;

    Ok(handle)
}

/// Record count, latency and in-flight requests per route
///
/// The label is the matched route template (`/login/oauth2/code/{registration_id}`),
/// unmatched requests share a single label.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let in_flight = gauge!("http_requests_in_flight");
    in_flight.increment(1.0);
    let response = next.run(req).await;
    in_flight.decrement(1.0);

    let status = response.status().as_u16().to_string();
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        REQUEST_DURATION,
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());

    response
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, handle.render())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Login,
    Logout,
}

impl AuthEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

/// Record a login or logout for a client registration
pub fn record_auth_event(event: AuthEvent, registration_id: &str, success: bool) {
    let status = if success { "success" } else { "failure" };

    counter!(
        "auth_events_total",
        "type" => event.as_str(),
        "registration" => registration_id.to_string(),
        "status" => status
    )
    .increment(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceEvent {
    Generated,
    Removed,
    /// An ID token carried a nonce the session never issued
    Rejected,
}

impl NonceEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Removed => "removed",
            Self::Rejected => "rejected",
        }
    }
}

pub fn record_nonce_event(event: NonceEvent) {
    counter!("oidc_nonce_events_total", "event" => event.as_str()).increment(1);
}

/// Live sessions after a cleanup run
pub fn record_active_sessions(count: usize) {
    gauge!("sessions_active").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_track_metrics_passes_response_through() {
        // No recorder installed: metrics calls are no-ops
        let app = Router::new()
            .route("/items/{id}", get(|| async { "OK" }))
            .layer(middleware::from_fn(track_metrics));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/items/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(AuthEvent::Login.as_str(), "login");
        assert_eq!(AuthEvent::Logout.as_str(), "logout");
        assert_eq!(NonceEvent::Generated.as_str(), "generated");
        assert_eq!(NonceEvent::Removed.as_str(), "removed");
        assert_eq!(NonceEvent::Rejected.as_str(), "rejected");
    }
}

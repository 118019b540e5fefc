//! HTTP endpoints implemented by the fluxa-x402 facilitator.
//!
//! Protocol-critical endpoints (`/verify`, `/settle`) plus discovery
//! (`/supported`) and benchmark counters. Semantic payment failures are
//! carried inside 200 bodies; HTTP errors are reserved for malformed JSON
//! and internal faults. Payment-bearing bodies are capped at
//! [`MAX_PAYMENT_HEADER_BYTES`]; anything larger answers 431.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use fluxa_x402_types::codec::MAX_PAYMENT_HEADER_BYTES;
use fluxa_x402_types::facilitator::{Facilitator, VerifyRequest};

use crate::dispatch::{FacilitatorLocal, FacilitatorLocalError};
use crate::metrics::BenchmarkMetrics;

/// Shared state of the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub facilitator: FacilitatorLocal,
    pub metrics: BenchmarkMetrics,
}

impl IntoResponse for FacilitatorLocalError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_root))
        .route("/verify", get(get_verify_info))
        .route("/verify", post(post_verify))
        .route("/settle", get(get_settle_info))
        .route("/settle", post(post_settle))
        .route("/supported", get(get_supported))
        .route("/health", get(get_health))
        .route("/benchmark/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(MAX_PAYMENT_HEADER_BYTES))
}

/// Maps a payment-body extractor rejection onto the protocol's statuses:
/// bodies over the cap answer 431, other malformed requests keep their
/// axum status.
fn payment_body_rejection(rejection: JsonRejection) -> Response {
    let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
    } else {
        rejection.status()
    };
    (status, Json(json!({ "error": rejection.body_text() }))).into_response()
}

/// `GET /`: greeting.
pub async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

/// `GET /verify`: machine-readable description of the verify endpoint.
pub async fn get_verify_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /settle`: machine-readable description of the settle endpoint.
pub async fn get_settle_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `POST /verify`: checks a payment payload against requirements.
pub async fn post_verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return payment_body_rejection(rejection),
    };
    match state.facilitator.verify(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, "verification failed");
            error.into_response()
        }
    }
}

/// `POST /settle`: executes settlement for a verified payment.
pub async fn post_settle(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return payment_body_rejection(rejection),
    };
    match state.facilitator.settle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, "settlement failed");
            error.into_response()
        }
    }
}

/// `GET /supported`: lists the payment kinds this facilitator serves.
pub async fn get_supported(State(state): State<AppState>) -> impl IntoResponse {
    match state.facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(json!(supported))).into_response(),
        Err(error) => error.into_response(),
    }
}

pub async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    get_supported(State(state)).await
}

/// `GET /benchmark/metrics`: counters for verified and settled receipts.
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.metrics.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fluxa_x402_types::scheme::FacilitatorSchemeRegistry;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState {
            facilitator: FacilitatorLocal::new(Arc::new(FacilitatorSchemeRegistry::new())),
            metrics: BenchmarkMetrics::new(),
        };
        routes().with_state(state)
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_oversized_payment_body_answers_431() {
        let body = "a".repeat(MAX_PAYMENT_HEADER_BYTES + 1);
        let response = app().oneshot(post("/verify", body)).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_client_error() {
        let response = app().oneshot(post("/settle", "{not json")).await.unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(
            response.status(),
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn test_unroutable_payment_is_a_200_with_reason() {
        let body = serde_json::json!({
            "paymentPayload": {
                "x402Version": 2,
                "accepted": {
                    "scheme": "unknown",
                    "network": "fluxa:monetize",
                    "amount": "25",
                    "asset": "FLUXA_CREDIT",
                    "payTo": "fluxa:facilitator:us-east-1",
                    "maxTimeoutSeconds": 60
                },
                "payload": {}
            },
            "paymentRequirements": {
                "scheme": "unknown",
                "network": "fluxa:monetize",
                "amount": "25",
                "asset": "FLUXA_CREDIT",
                "payTo": "fluxa:facilitator:us-east-1",
                "maxTimeoutSeconds": 60
            }
        });
        let response = app()
            .oneshot(post("/verify", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

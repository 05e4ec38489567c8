//! HTTP routes.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::duty::DutyLookup;
use crate::error::ApiResult;

#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<DutyLookup>,
    pub calendar_id: Arc<str>,
}

/// Response body of `GET /v1/duty`
#[derive(Debug, Serialize)]
pub struct DutyResponse {
    pub number: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/duty", get(get_duty))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn get_duty(State(state): State<AppState>) -> ApiResult<Json<DutyResponse>> {
    let number = state.lookup.get_duty(&state.calendar_id).await?;
    Ok(Json(DutyResponse { number }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fakes::FakeCalendar;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn app(calendar: FakeCalendar) -> Router {
        router(AppState {
            lookup: Arc::new(DutyLookup::new(Arc::new(calendar))),
            calendar_id: Arc::from("duty@example.com"),
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_duty_returns_number() {
        let (status, content_type, body) = get(
            app(FakeCalendar::with_descriptions(&["Call +380501234567"])),
            "/v1/duty",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "number": "+380501234567" }));
    }

    #[tokio::test]
    async fn test_duty_failure_is_plain_text_500() {
        let (status, content_type, body) =
            get(app(FakeCalendar::with_descriptions(&[])), "/v1/duty").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
        assert_eq!(body, "No events found");
    }

    #[tokio::test]
    async fn test_health_and_unknown_routes() {
        let (status, _, _) = get(app(FakeCalendar::default()), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = get(app(FakeCalendar::default()), "/v1/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! Consistent response envelope for all JSON API endpoints.
//!
//! Success: `{ "success": true, "data": T }`
//! Error:   `{ "success": false, "error": "..." }`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::storage::StorageError;

/// Successful response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        let body = Self {
            success: true,
            data,
        };
        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ApiErrorResponse {
    fn build(status: StatusCode, msg: impl Into<String>) -> Response {
        let body = Self {
            success: false,
            error: msg.into(),
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn storage(err: &StorageError) -> Response {
        tracing::warn!(error = %err, "[API] Storage query failed");
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_shape() {
        let resp = ApiResponse::ok(serde_json::json!([1, 2]));
        assert_eq!(resp.status(), StatusCode::OK);

        let v = json(resp).await;
        assert_eq!(v["success"], true);
        assert_eq!(v["data"], serde_json::json!([1, 2]));
        assert!(v.get("error").is_none());
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let resp = ApiErrorResponse::bad_request("count must be positive");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let v = json(resp).await;
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "count must be positive");
    }
}

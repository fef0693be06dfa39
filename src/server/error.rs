use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;

use crate::matcher::MatchError;
use crate::recognizer::RecognizeError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<RecognizeError>() {
            Some(RecognizeError::Decode(_) | RecognizeError::Base64(_)) => StatusCode::BAD_REQUEST,
            Some(RecognizeError::StaleReference(_)) => StatusCode::CONFLICT,
            Some(RecognizeError::Match(MatchError::Timeout)) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {:?}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: RecognizeError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_error_status() {
        let decode = image::load_from_memory(b"garbage").unwrap_err();
        assert_eq!(status_of(RecognizeError::Decode(decode)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(RecognizeError::StaleReference(7)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(RecognizeError::Match(MatchError::Timeout)),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(RecognizeError::Catalog(anyhow::anyhow!("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("other")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use tracing::{debug, error};

/// A domain error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::MetadataUnresolved
            | DomainError::ReaderInit(_)
            | DomainError::EngineClosed => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::SeekOutOfRange { .. } | DomainError::RangeNotSatisfiable(_) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            DomainError::NotFound(_) | DomainError::FileNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("❌ {}", self.0);
        } else {
            debug!(%status, "request failed: {}", self.0);
        }

        let unsatisfiable_length = match &self.0 {
            DomainError::RangeNotSatisfiable(length) => Some(*length),
            DomainError::SeekOutOfRange { length, .. } => Some(*length),
            _ => None,
        };

        match unsatisfiable_length {
            Some(length) => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{length}"))],
                self.0.to_string(),
            )
                .into_response(),
            None => (status, self.0.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_statuses() {
        assert_eq!(
            ApiError(DomainError::MetadataUnresolved).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(DomainError::EngineClosed).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(DomainError::SeekOutOfRange { requested: 5, length: 4 }).status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            ApiError(DomainError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(DomainError::ReaderClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unsatisfiable_range_reports_length() {
        let response = ApiError(DomainError::RangeNotSatisfiable(1000)).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}

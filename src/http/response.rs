//! Error responses.
//!
//! # Mapping
//! - Injected faults: 503 Service Unavailable
//! - Everything else: 500 Internal Server Error

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// JSON body returned with every error status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InjectedFault(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::InjectedFault;

    #[test]
    fn test_status_mapping() {
        let fault = Error::from(InjectedFault {
            operation: "GetWeatherForecast".into(),
            message: "down".into(),
        });
        assert_eq!(fault.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let io = Error::from(std::io::Error::other("disk"));
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(io.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

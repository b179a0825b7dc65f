use axum::http::StatusCode;
use axum::response::IntoResponse;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Service-side failures, translated to status codes at the HTTP boundary.
///
/// Bodies are plain text on purpose: polling clients match the exhausted
/// message prefix to tell "nothing left to do" from real failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no open records {state} in {ledger}")]
    Exhausted { state: String, ledger: String },

    #[error("no '{name}' in {dir}")]
    LedgerNotFound { name: String, dir: String },

    #[error("no {identifier} in {ledger}")]
    RecordNotFound { identifier: String, ledger: String },

    #[error("invalid record payload: {0}")]
    BadPayload(String),

    #[error("client not allowed")]
    NotAllowed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Exhausted { .. }
            | ServiceError::LedgerNotFound { .. }
            | ServiceError::RecordNotFound { .. }
            | ServiceError::NotAllowed => StatusCode::NOT_FOUND,
            ServiceError::BadPayload(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        // rejected clients get no hint at all
        if matches!(self, ServiceError::NotAllowed) {
            return status.into_response();
        }
        (status, self.to_string()).into_response()
    }
}

impl From<LedgerError> for ServiceError {
    fn from(value: LedgerError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::client::EXHAUSTED_PREFIX;

    #[test]
    fn test_exhausted_body_matches_client_prefix() {
        let err = ServiceError::Exhausted {
            state: "n.a.".into(),
            ledger: "oai_list".into(),
        };
        assert!(err.to_string().starts_with(EXHAUSTED_PREFIX));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}

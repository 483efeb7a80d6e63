use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("cache error: {0}")]
    Store(#[from] StoreError),

    #[error("Unable to find user requested data")]
    NotFound,
}

impl ServeError {
    pub fn internal(str: impl ToString) -> Self {
        ServeError::Internal(str.to_string())
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let (status, string) = match self {
            ServeError::NotFound => (
                StatusCode::NOT_FOUND,
                "unable to find requested data".to_string(),
            ),
            _ => {
                error!("internal server error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error": string
            })),
        )
            .into_response()
    }
}

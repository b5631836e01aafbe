//! Error types for the relay service HTTP API

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use parley_core::ErrorEnvelope;
use std::fmt;

/// Service error types
#[derive(Debug)]
pub enum ServiceError {
    /// Unknown identity or route
    NotFound,
    /// Store failure
    Storage(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound => write!(f, "Not found"),
            ServiceError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ServiceError::NotFound => ErrorEnvelope::not_found(),
            ServiceError::Storage(msg) => ErrorEnvelope::internal(msg.clone()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<parley_core::Error> for ServiceError {
    fn from(err: parley_core::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

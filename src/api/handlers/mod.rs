pub mod health;
pub mod keystroke;
pub mod profile;

use actix_web::HttpResponse;
use log::error;
use serde::{Deserialize, Serialize};

use crate::biometrics::BiometricError;
use crate::utils::validation_error_message;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorResponse { error: message.into() }
    }
}

/// Map engine errors onto status codes; internal details stay in the log
pub fn error_response(err: BiometricError) -> HttpResponse {
    match err {
        BiometricError::MalformedPattern(reason) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(validation_error_message(&reason)))
        }
        BiometricError::ProfileNotFound(user_id) => {
            HttpResponse::NotFound().json(ErrorResponse::new(format!("No biometric profile for user {}", user_id)))
        }
        other => {
            error!("Request failed: {}", other);
            HttpResponse::InternalServerError().json(ErrorResponse::new("Internal server error"))
        }
    }
}

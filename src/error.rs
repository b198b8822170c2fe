//! Unified error handling for the backend API surface.
//!
//! This covers the JSON API (payment links, admin, content). The Click
//! webhook endpoints deliberately bypass it: their protocol reports failure
//! in-band with HTTP 200 (see `services::click_processor`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::error::DatabaseError;

/// Machine-readable error codes for API clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "USER_NOT_FOUND")]
    UserNotFound,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONTENT_SYNC_ERROR")]
    ContentSyncError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    UserNotFound {
        telegram_id: i64,
    },
    PaymentNotFound {
        reference: String,
    },
    Validation {
        field: String,
        message: String,
    },
    Unauthorized,
    Database {
        message: String,
        is_retryable: bool,
    },
    ContentSync {
        message: String,
    },
    Configuration {
        message: String,
    },
    Internal {
        message: String,
    },
}

/// Unified application error with request-id propagation.
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation {
            field: field.to_string(),
            message: message.into(),
        })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Internal {
            message: message.into(),
        })
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::UserNotFound { .. } => ErrorCode::UserNotFound,
            AppErrorKind::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
            AppErrorKind::Validation { .. } => ErrorCode::ValidationError,
            AppErrorKind::Unauthorized => ErrorCode::Unauthorized,
            AppErrorKind::Database { .. } => ErrorCode::DatabaseError,
            AppErrorKind::ContentSync { .. } => ErrorCode::ContentSyncError,
            AppErrorKind::Configuration { .. } => ErrorCode::ConfigurationError,
            AppErrorKind::Internal { .. } => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::UserNotFound { .. } | AppErrorKind::PaymentNotFound { .. } => 404,
            AppErrorKind::Validation { .. } => 400,
            AppErrorKind::Unauthorized => 401,
            AppErrorKind::Database { .. } => 503,
            AppErrorKind::ContentSync { .. } => 502,
            AppErrorKind::Configuration { .. } => 500,
            AppErrorKind::Internal { .. } => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Database { is_retryable, .. } => *is_retryable,
            AppErrorKind::ContentSync { .. } => true,
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::UserNotFound { telegram_id } => {
                format!("User {} not found", telegram_id)
            }
            AppErrorKind::PaymentNotFound { reference } => {
                format!("Payment {} not found", reference)
            }
            AppErrorKind::Validation { field, message } => {
                format!("Invalid {}: {}", field, message)
            }
            AppErrorKind::Unauthorized => "Unauthorized".to_string(),
            AppErrorKind::Database { .. } => "Storage is temporarily unavailable".to_string(),
            AppErrorKind::ContentSync { .. } => {
                "Content feed is temporarily unavailable".to_string()
            }
            AppErrorKind::Configuration { .. } | AppErrorKind::Internal { .. } => {
                "An internal server error occurred. Please try again later.".to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        AppError::new(AppErrorKind::Database {
            message: err.to_string(),
            is_retryable,
        })
    }
}

impl From<crate::services::content_sync::ContentSyncError> for AppError {
    fn from(err: crate::services::content_sync::ContentSyncError) -> Self {
        AppError::new(AppErrorKind::ContentSync {
            message: err.to_string(),
        })
    }
}

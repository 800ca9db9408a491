//! # Error Handling for Search
//!
//! Every failure surfaced by the parser, compiler, tokenizer and repository is
//! a [`SearchError`]. Client mistakes map to `400 Bad Request`; storage and
//! schema problems map to `500 Internal Server Error` and keep their details
//! in the server log.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use witsearch::{SearchError, SearchRepository};
//!
//! async fn handler(repo: &dyn SearchRepository) -> Result<Json<Vec<WorkItemRecord>>, SearchError> {
//!     let page = repo.filter(r#"{"space":"openshiftio"}"#, Some(0), Some(20)).await?;
//!     Ok(Json(page.items))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use std::fmt;

use crate::filtering::compiler::CompileError;

/// Search error type with automatic logging and sanitized responses
#[derive(Debug)]
pub enum SearchError {
    /// 400 Bad Request - a request parameter could not be accepted
    BadParameter {
        /// Parameter name (e.g., "start", "filter", "type")
        parameter: String,
        /// The offending value, echoed back to the caller
        value: String,
        /// Optional explanation of why the value was rejected
        reason: Option<String>,
    },

    /// 400 Bad Request - the filter parsed but could not be compiled
    InvalidFilter {
        /// Every compile error found in the expression
        errors: Vec<CompileError>,
    },

    /// 500 Internal Server Error - Database error (details logged, not exposed)
    Database {
        /// User-facing generic message
        message: String,
        /// Internal error (logged, not sent to user)
        internal: DbErr,
    },

    /// 500 Internal Server Error - Generic internal error
    Internal {
        /// User-facing generic message
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },
}

impl SearchError {
    /// Create a 400 error for a rejected parameter value
    ///
    /// # Example
    /// ```rust,ignore
    /// return Err(SearchError::bad_parameter("limit", "0"));
    /// ```
    pub fn bad_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BadParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: None,
        }
    }

    /// Create a 400 error for a rejected parameter value with an explanation
    pub fn bad_parameter_because(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::BadParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: Some(reason.into()),
        }
    }

    /// Create a 400 error carrying the collected compile errors
    pub fn invalid_filter(errors: Vec<CompileError>) -> Self {
        Self::InvalidFilter { errors }
    }

    /// Create a 500 error from a database error
    ///
    /// The database error details are logged but NOT sent to the user.
    pub fn database(err: DbErr) -> Self {
        Self::Database {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    /// Create a 500 error with optional details
    ///
    /// # Example
    /// ```rust,ignore
    /// return Err(SearchError::internal("Join references unknown column", Some(column)));
    /// ```
    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    /// Whether the caller is at fault
    #[must_use]
    pub fn is_bad_parameter(&self) -> bool {
        matches!(self, Self::BadParameter { .. } | Self::InvalidFilter { .. })
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadParameter { .. } | Self::InvalidFilter { .. } => StatusCode::BAD_REQUEST,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the user-facing error message (sanitized)
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::BadParameter {
                parameter,
                value,
                reason,
            } => match reason {
                Some(reason) => {
                    format!("Bad value for parameter '{parameter}': '{value}' ({reason})")
                }
                None => format!("Bad value for parameter '{parameter}': '{value}'"),
            },
            Self::InvalidFilter { errors } => {
                if let [single] = errors.as_slice() {
                    single.to_string()
                } else {
                    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                    format!("Invalid filter expression: {}", messages.join(", "))
                }
            }
            Self::Database { message, .. } | Self::Internal { message, .. } => message.clone(),
        }
    }

    /// Log internal error details (not sent to user)
    fn log_internal(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error during search");
            }
            Self::Internal {
                internal: Some(details),
                message,
            } => {
                tracing::error!(details = %details, message = %message, "Internal search error");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "Search request rejected"
                );
            }
        }
    }
}

/// Error response sent to users (sanitized)
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let response = match &self {
            Self::InvalidFilter { errors } => ErrorResponse {
                error: "Invalid filter expression".to_string(),
                details: Some(errors.iter().map(ToString::to_string).collect()),
            },
            _ => ErrorResponse {
                error: self.user_message(),
                details: None,
            },
        };

        (status, Json(response)).into_response()
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database { internal, .. } => Some(internal),
            _ => None,
        }
    }
}

impl From<DbErr> for SearchError {
    fn from(err: DbErr) -> Self {
        Self::database(err)
    }
}

impl From<Vec<CompileError>> for SearchError {
    fn from(errors: Vec<CompileError>) -> Self {
        Self::invalid_filter(errors)
    }
}

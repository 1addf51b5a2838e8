use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::views::ErrorPage;

pub type AppResult<T> = Result<T, AppError>;
pub type PageResult<T> = Result<T, PageError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn not_found_with(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<askama::Error> for AppError {
    fn from(value: askama::Error) -> Self {
        AppError::internal(format!("template error: {value}"))
    }
}

pub fn is_unique_violation(error: &diesel::result::Error) -> bool {
    matches!(
        error,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        )
    )
}

/// Error for HTML pages: same status as the wrapped [`AppError`], rendered
/// through the error template. Server-side failures are logged and shown
/// with a generic message.
#[derive(Debug)]
pub struct PageError(pub AppError);

impl PageError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(AppError::bad_request(message))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self(AppError::forbidden(message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(AppError::not_found_with(message))
    }
}

impl From<AppError> for PageError {
    fn from(value: AppError) -> Self {
        PageError(value)
    }
}

macro_rules! page_error_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for PageError {
                fn from(value: $source) -> Self {
                    PageError(AppError::from(value))
                }
            }
        )*
    };
}

page_error_from!(
    diesel::result::Error,
    jsonwebtoken::errors::Error,
    anyhow::Error,
    serde_json::Error,
    askama::Error,
);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let PageError(error) = self;
        let status = error.status;
        let hide_details = status.is_server_error()
            && !matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
            );
        let message = if hide_details {
            tracing::error!(status = %status, error = %error.message, "request failed");
            "Something went wrong. Please try again.".to_string()
        } else {
            error.message
        };

        let page = ErrorPage {
            status: status.as_u16(),
            message: &message,
        };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "failed to render error page");
                (status, message).into_response()
            }
        }
    }
}

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt::{Display, Formatter};

use crate::db::DbError;
use crate::models::pagination::PaginationInfos;
use crate::study::StudyServiceError;
use crate::sync::SyncError;

#[derive(Debug, PartialEq)]
pub enum AppErrorType {
    NotFoundError,
    DbError,
    AuthError,
    ForbiddenError,
    PayloadValidationError,
    ConflictError,
    ConfigError,
    ApiError,
    InternalServerError,
}

#[derive(Debug, PartialEq)]
pub struct AppError {
    pub error_type: AppErrorType,
    pub message: Option<String>,
    pub cause: Option<String>,
}

#[derive(Serialize)]
pub struct AppErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    pub fn message(&self) -> String {
        match self {
            AppError {
                message: Some(message),
                ..
            } => message.clone(),

            AppError {
                message: None,
                error_type: AppErrorType::NotFoundError,
                ..
            } => "The requested item was not found".to_string(),
            _ => "An unexpected error has occurred".to_string(),
        }
    }

    pub fn db_error(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::DbError,
            message: Some(error.to_string()),
        }
    }

    pub fn not_found(error: impl ToString) -> AppError {
        AppError {
            cause: None,
            error_type: AppErrorType::NotFoundError,
            message: Some(error.to_string()),
        }
    }

    pub fn bad_request(error: impl ToString) -> AppError {
        AppError {
            cause: None,
            error_type: AppErrorType::PayloadValidationError,
            message: Some(error.to_string()),
        }
    }

    pub fn forbidden_error(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::ForbiddenError,
            message: Some(error.to_string()),
        }
    }

    pub fn unauthorized(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::AuthError,
            message: Some(error.to_string()),
        }
    }

    pub fn internal_error(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::InternalServerError,
            message: Some(error.to_string()),
        }
    }
}

impl From<DbError> for AppError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound(what) => AppError::not_found(format!("{} not found", what)),
            DbError::Conflict(what) => AppError {
                cause: None,
                error_type: AppErrorType::ConflictError,
                message: Some(what),
            },
            other => AppError::db_error(other),
        }
    }
}

impl From<StudyServiceError> for AppError {
    fn from(error: StudyServiceError) -> Self {
        match error {
            StudyServiceError::NotFound(what) => AppError::not_found(what),
            other => AppError {
                cause: Some(other.to_string()),
                error_type: AppErrorType::ApiError,
                message: Some("study service request failed".to_string()),
            },
        }
    }
}

impl From<SyncError> for AppError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::NotFound(what) => AppError::not_found(what),
            SyncError::Overlap(message) => AppError {
                cause: None,
                error_type: AppErrorType::ConflictError,
                message: Some(message),
            },
            SyncError::Config(message) => AppError {
                cause: None,
                error_type: AppErrorType::ConfigError,
                message: Some(message),
            },
            SyncError::Persistence(e) => e.into(),
            SyncError::ExternalLookup(e) => e.into(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self.error_type {
            AppErrorType::AuthError => StatusCode::UNAUTHORIZED,
            AppErrorType::DbError | AppErrorType::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppErrorType::NotFoundError => StatusCode::NOT_FOUND,
            AppErrorType::PayloadValidationError | AppErrorType::ConfigError => {
                StatusCode::BAD_REQUEST
            }
            AppErrorType::ConflictError => StatusCode::CONFLICT,
            AppErrorType::ApiError => StatusCode::BAD_GATEWAY,
            AppErrorType::ForbiddenError => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(AppErrorResponse {
            success: false,
            message: self.message(),
        })
    }
}

#[derive(Serialize)]
pub struct AppSuccessResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfos>,
}

impl<T: Serialize> AppSuccessResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            pagination: None,
        }
    }
}

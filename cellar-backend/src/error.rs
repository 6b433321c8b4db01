use axum::{
  Json,
  extract::{
    FromRequest, FromRequestParts, Path, Query, Request,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::request::Parts,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::validation::{FieldErrors, ValidationError};

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
      fields: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
      fields: None,
    }
  }

  pub fn with_fields(error: impl Into<String>, fields: FieldErrors) -> Self {
    Self {
      error: error.into(),
      details: None,
      fields: Some(fields.into_map()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  DatabaseError(cellar_db::DbError),
  ValidationError(FieldErrors),
  /// Missing, malformed or expired credentials
  Unauthenticated(String),
  /// Request body could not be read as the expected format
  BadRequest(String),
  PayloadTooLarge,
  /// No such route parameter, e.g. a non-numeric id
  NotFound,
  /// IO, hashing or signing failures; details are logged, not returned
  Internal(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::DatabaseError(db_err) => {
        // Return user-friendly error to client
        let (status, message) = match db_err {
          cellar_db::DbError::BottleNotFound => (StatusCode::NOT_FOUND, "Not found."),
          cellar_db::DbError::UserNotFound => (StatusCode::NOT_FOUND, "User not found."),
          cellar_db::DbError::UsernameTaken => {
            let fields = FieldErrors::single("username", ValidationError::UsernameTaken);
            return AppError::ValidationError(fields).into_response();
          }
          cellar_db::DbError::Sqlite(_) | cellar_db::DbError::Connection(_) => {
            // Don't expose internal database errors
            tracing::error!(?db_err, "Internal database error");
            (
              StatusCode::INTERNAL_SERVER_ERROR,
              "An internal error occurred. Please try again later.",
            )
          }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
      }
      AppError::ValidationError(fields) => {
        tracing::warn!(?fields, "Validation failed");
        let error_response = ErrorResponse::with_fields("Validation failed.", fields);
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
      }
      AppError::Unauthenticated(msg) => {
        tracing::debug!(reason = %msg, "Unauthenticated request");
        (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(msg))).into_response()
      }
      AppError::BadRequest(details) => {
        tracing::warn!(%details, "Malformed request");
        let error_response = ErrorResponse::with_details("Malformed request.", details);
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
      }
      AppError::NotFound => (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Not found.")),
      )
        .into_response(),
      AppError::PayloadTooLarge => (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(ErrorResponse::new("Request body too large.")),
      )
        .into_response(),
      AppError::Internal(details) => {
        tracing::error!(%details, "Internal error");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(ErrorResponse::new(
            "An internal error occurred. Please try again later.",
          )),
        )
          .into_response()
      }
    }
  }
}

impl From<cellar_db::DbError> for AppError {
  fn from(err: cellar_db::DbError) -> Self {
    AppError::DatabaseError(err)
  }
}

impl From<FieldErrors> for AppError {
  fn from(errors: FieldErrors) -> Self {
    AppError::ValidationError(errors)
  }
}

impl From<crate::auth::AuthError> for AppError {
  fn from(err: crate::auth::AuthError) -> Self {
    use crate::auth::AuthError;
    match err {
      AuthError::Hashing(details) | AuthError::Signing(details) => AppError::Internal(details),
      other => AppError::Unauthenticated(other.to_string()),
    }
  }
}

impl AppError {
  /// Map an axum body rejection, keeping its 413 status
  pub fn from_rejection(status: StatusCode, details: String) -> Self {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
      AppError::PayloadTooLarge
    } else {
      AppError::BadRequest(details)
    }
  }
}

/// `Json` extractor whose rejections use the API error body
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
  Json<T>: FromRequest<S, Rejection = JsonRejection>,
  S: Send + Sync,
{
  type Rejection = AppError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let Json(value) = Json::<T>::from_request(req, state)
      .await
      .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
    Ok(Self(value))
  }
}

/// `Path` extractor: an id that does not parse names no resource, so 404
pub struct AppPath<T>(pub T);

impl<S, T> FromRequestParts<S> for AppPath<T>
where
  Path<T>: FromRequestParts<S, Rejection = PathRejection>,
  S: Send + Sync,
{
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    match Path::<T>::from_request_parts(parts, state).await {
      Ok(Path(value)) => Ok(Self(value)),
      Err(PathRejection::FailedToDeserializePathParams(e)) => {
        tracing::debug!(error = %e.body_text(), "unparsable path parameter");
        Err(AppError::NotFound)
      }
      Err(e) => Err(AppError::Internal(e.body_text())),
    }
  }
}

/// `Query` extractor whose rejections use the API error body
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
  Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
  S: Send + Sync,
{
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let Query(value) = Query::<T>::from_request_parts(parts, state)
      .await
      .map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(Self(value))
  }
}

impl From<std::io::Error> for AppError {
  fn from(err: std::io::Error) -> Self {
    AppError::Internal(format!("io error: {err}"))
  }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crudapi_core::{CoreError, ExecutionError, HookError};
use crudapi_query::QueryError;
use crudapi_storage::StorageError;
use thiserror::Error;

use crate::document::{ErrorDocument, ErrorObject, ErrorSource, JsonApi};
use crate::serializer::SerializeError;

/// High-level API errors mapped to HTTP responses and JSON:API error objects.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid query parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },
    #[error("Invalid document at '{pointer}': {message}")]
    InvalidDocument { pointer: String, message: String },
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
    pub fn invalid_document(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn unprocessable_entity(msg: impl Into<String>) -> Self {
        Self::UnprocessableEntity(msg.into())
    }
    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }
    pub fn not_acceptable(msg: impl Into<String>) -> Self {
        Self::NotAcceptable(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameter { .. }
            | ApiError::InvalidDocument { .. }
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidParameter { .. } => "invalid_parameter",
            ApiError::InvalidDocument { .. } => "invalid_document",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::UnprocessableEntity(_) => "unprocessable_entity",
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::NotAcceptable(_) => "not_acceptable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ApiError::InvalidParameter { .. } => "Invalid Query Parameter",
            ApiError::InvalidDocument { .. } => "Invalid Document",
            ApiError::BadRequest(_) => "Bad Request",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "Not Found",
            ApiError::Conflict(_) => "Conflict",
            ApiError::UnprocessableEntity(_) => "Unprocessable Entity",
            ApiError::UnsupportedMediaType(_) => "Unsupported Media Type",
            ApiError::NotAcceptable(_) => "Not Acceptable",
            ApiError::Internal(_) => "Internal Server Error",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ApiError::InvalidParameter { message, .. }
            | ApiError::InvalidDocument { message, .. } => message.clone(),
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::UnprocessableEntity(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::NotAcceptable(msg)
            | ApiError::Internal(msg) => msg.clone(),
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        let source = match self {
            ApiError::InvalidParameter { parameter, .. } => Some(ErrorSource {
                parameter: Some(parameter.clone()),
                pointer: None,
            }),
            ApiError::InvalidDocument { pointer, .. } => Some(ErrorSource {
                pointer: Some(pointer.clone()),
                parameter: None,
            }),
            _ => None,
        };
        ErrorObject {
            id: uuid::Uuid::new_v4().to_string(),
            status: self.status_code().as_u16().to_string(),
            code: self.code().to_string(),
            title: self.title().to_string(),
            detail: self.detail(),
            source,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        let body = ErrorDocument {
            errors: vec![self.to_error_object()],
        };
        (status, JsonApi(body)).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::invalid_parameter(err.parameter().to_string(), err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StorageError::AlreadyExists { .. } => ApiError::Conflict(err.to_string()),
            StorageError::InvalidRecord { .. } => ApiError::BadRequest(err.to_string()),
            StorageError::Internal { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<HookError> for ApiError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Rejected(msg) => ApiError::UnprocessableEntity(msg),
            HookError::Forbidden(msg) => ApiError::Forbidden(msg),
            HookError::NotFound(msg) => ApiError::NotFound(msg),
            HookError::Execution(_) | HookError::Other(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<SerializeError> for ApiError {
    fn from(err: SerializeError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ExecutionError<ApiError>> for ApiError {
    fn from(err: ExecutionError<ApiError>) -> Self {
        match err {
            ExecutionError::BeforeHook { hook, source } => {
                tracing::debug!(hook = %hook, error = %source, "Action halted by before hook");
                source.into()
            }
            ExecutionError::Operation(err) => err,
            ExecutionError::Configuration(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn into_response_sets_status_and_content_type() {
        let resp = ApiError::not_found("articles/1").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            crate::JSONAPI_MEDIA_TYPE
        );
    }

    #[test]
    fn error_object_shape() {
        let object = ApiError::invalid_parameter("filter[secret]", "not permitted").to_error_object();
        assert_eq!(object.status, "400");
        assert_eq!(object.code, "invalid_parameter");
        assert_eq!(object.detail, "not permitted");
        assert_eq!(
            object.source.unwrap().parameter.as_deref(),
            Some("filter[secret]")
        );
        assert!(uuid::Uuid::parse_str(&object.id).is_ok());

        let object = ApiError::invalid_document("/data/attributes/password", "excluded")
            .to_error_object();
        assert_eq!(
            object.source.unwrap().pointer.as_deref(),
            Some("/data/attributes/password")
        );
    }

    #[test]
    fn error_ids_are_unique() {
        let err = ApiError::internal("x");
        assert_ne!(err.to_error_object().id, err.to_error_object().id);
    }

    #[test]
    fn variants_map_to_status() {
        let cases = [
            (ApiError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (
                ApiError::unprocessable_entity("x"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::unsupported_media_type("x"),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (ApiError::not_acceptable("x"), StatusCode::NOT_ACCEPTABLE),
            (ApiError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn conversions() {
        let err: ApiError = QueryError::invalid("sort", "malformed").into();
        assert!(matches!(err, ApiError::InvalidParameter { ref parameter, .. } if parameter == "sort"));

        let err: ApiError = StorageError::not_found("articles", "1").into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err: ApiError = StorageError::already_exists("articles", "1").into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ApiError = ExecutionError::<ApiError>::BeforeHook {
            hook: "authorize".into(),
            source: HookError::forbidden("nope"),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err: ApiError = ExecutionError::<ApiError>::BeforeHook {
            hook: "validate".into(),
            source: HookError::rejected("title missing"),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let err: ApiError =
            ExecutionError::Operation(ApiError::not_found("articles/9")).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = ExecutionError::<ApiError>::Configuration(CoreError::unbound_hook(
            "ArticlesController",
            "setRecord",
        ))
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

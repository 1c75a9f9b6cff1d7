// HTTP error mapping for ACL operations
// (Cannot impl foreign trait for foreign type, so AclError is wrapped)

use std::fmt::{Display, Formatter};

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use batata_acl::AclError;
use serde::{Deserialize, Serialize};

/// Error body returned to API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError(pub AclError);

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AclError> for ApiError {
    fn from(value: AclError) -> Self {
        ApiError(value)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AclError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AclError::NotFound(_) => StatusCode::NOT_FOUND,
            AclError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AclError::Disabled => StatusCode::UNAUTHORIZED,
            AclError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AclError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self.0, "ACL request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody::new(self.0.to_string()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

//! The wire-facing error taxonomy (§4.8): a flat set of kinds with fixed
//! HTTP statuses, shared by every component in the engine.

use http::StatusCode;
use serde::Serialize;

/// One of the ten fixed wire error kinds. Every fallible component-internal
/// error eventually converts into one of these at the boundary where the
/// dispatcher consumes it.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum XrpcErrorKind {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        /// Custom wire `error` name, if the caller supplied one.
        name: Option<String>,
    },

    #[error("Authentication Required")]
    AuthRequired { message: Option<String> },

    #[error("Forbidden")]
    Forbidden { message: Option<String> },

    #[error("request entity too large")]
    PayloadTooLarge { message: Option<String> },

    #[error("Rate Limit Exceeded")]
    RateLimitExceeded { message: Option<String> },

    #[error("Internal Server Error")]
    InternalServerError {
        /// Full detail, logged but never sent on the wire.
        detail: String,
    },

    #[error("Method Not Implemented")]
    MethodNotImplemented { message: Option<String> },

    #[error("Upstream Failure")]
    UpstreamFailure { message: Option<String> },

    #[error("Upstream Timeout")]
    UpstreamTimeout { message: Option<String> },

    #[error("Not Enough Resources")]
    NotEnoughResources { message: Option<String> },
}

impl XrpcErrorKind {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            name: None,
        }
    }

    pub fn invalid_request_named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            name: Some(name.into()),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::InternalServerError {
            detail: detail.into(),
        }
    }

    /// The fixed HTTP status for this kind (§4.8). Coercion of unrecognized
    /// statuses to 500 happens at the call site constructing an
    /// [`XrpcErrorKind`] from a non-taxonomy status, not here.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::AuthRequired { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MethodNotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::UpstreamFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::NotEnoughResources { .. } => StatusCode::INSUFFICIENT_STORAGE,
        }
    }

    /// The machine-readable wire `error` name (§4.8 table), or a
    /// handler-supplied custom name for `InvalidRequest`.
    pub fn wire_name(&self) -> &str {
        match self {
            Self::InvalidRequest { name, .. } => name.as_deref().unwrap_or("InvalidRequest"),
            Self::AuthRequired { .. } => "AuthenticationRequired",
            Self::Forbidden { .. } => "Forbidden",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::InternalServerError { .. } => "InternalServerError",
            Self::MethodNotImplemented { .. } => "MethodNotImplemented",
            Self::UpstreamFailure { .. } => "UpstreamFailure",
            Self::UpstreamTimeout { .. } => "UpstreamTimeout",
            Self::NotEnoughResources { .. } => "NotEnoughResources",
        }
    }

    /// The human-readable wire `message`. 500s never leak `detail`.
    pub fn wire_message(&self) -> String {
        match self {
            Self::InvalidRequest { message, .. } => message.clone(),
            Self::AuthRequired { message } => {
                message.clone().unwrap_or_else(|| "Authentication Required".into())
            }
            Self::Forbidden { message } => message.clone().unwrap_or_else(|| "Forbidden".into()),
            Self::PayloadTooLarge { message } => message
                .clone()
                .unwrap_or_else(|| "request entity too large".into()),
            Self::RateLimitExceeded { message } => {
                message.clone().unwrap_or_else(|| "Rate Limit Exceeded".into())
            }
            Self::InternalServerError { .. } => "Internal Server Error".into(),
            Self::MethodNotImplemented { message } => message
                .clone()
                .unwrap_or_else(|| "Method Not Implemented".into()),
            Self::UpstreamFailure { message } => {
                message.clone().unwrap_or_else(|| "Upstream Failure".into())
            }
            Self::UpstreamTimeout { message } => {
                message.clone().unwrap_or_else(|| "Upstream Timeout".into())
            }
            Self::NotEnoughResources { message } => message
                .clone()
                .unwrap_or_else(|| "Not Enough Resources".into()),
        }
    }

    /// Build an `XrpcErrorKind` from an arbitrary status code, coercing
    /// anything outside `[400, 600)` to 500 per §4.8.
    pub fn from_status(status: StatusCode, name: Option<String>, message: Option<String>) -> Self {
        if !(400..600).contains(&status.as_u16()) {
            return Self::internal(format!(
                "handler produced out-of-range status {status}"
            ));
        }
        match status {
            StatusCode::UNAUTHORIZED => Self::AuthRequired { message },
            StatusCode::FORBIDDEN => Self::Forbidden { message },
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge { message },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded { message },
            StatusCode::NOT_IMPLEMENTED => Self::MethodNotImplemented { message },
            StatusCode::BAD_GATEWAY => Self::UpstreamFailure { message },
            StatusCode::GATEWAY_TIMEOUT => Self::UpstreamTimeout { message },
            StatusCode::INSUFFICIENT_STORAGE => Self::NotEnoughResources { message },
            StatusCode::INTERNAL_SERVER_ERROR => {
                Self::internal(message.unwrap_or_else(|| "internal error".into()))
            }
            _ => Self::InvalidRequest {
                message: message.unwrap_or_else(|| "Invalid Request".into()),
                name,
            },
        }
    }

    /// The `{ "error": ..., "message": ... }` wire body (§6).
    pub fn wire_body(&self) -> WireErrorBody {
        WireErrorBody {
            error: self.wire_name().to_string(),
            message: self.wire_message(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WireErrorBody {
    pub error: String,
    pub message: String,
}

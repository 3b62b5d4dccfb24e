use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::http::StatusCode;
use actix_web::{self as aweb, HttpResponseBuilder};
use serde::{Deserialize, Serialize};

/// Whether error responses may carry an `innererror` payload with the source
/// chain. Flipped on at startup when the process runs in development mode.
static INCLUDE_INNER_ERROR: AtomicBool = AtomicBool::new(false);

pub fn include_inner_error(enabled: bool) {
    INCLUDE_INNER_ERROR.store(enabled, Ordering::Relaxed);
}

/// The wire error shape: `{"error": {"code": …, "message": …, …}}`.
///
/// Every error leaving the HTTP surface is rendered through this type; the
/// body is always a valid JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(skip)]
    status: StatusCode,
    error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ErrorBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub innererror: Option<serde_json::Value>,
}

impl ResponseError {
    pub fn from_msg(message: String, code: Code) -> Self {
        Self {
            status: code.http(),
            error: ErrorBody {
                code: code.name().to_string(),
                message,
                target: None,
                details: None,
                innererror: None,
            },
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.error.target = Some(target.into());
        self
    }

    pub fn with_inner_error(mut self, inner: serde_json::Value) -> Self {
        self.error.innererror = Some(inner);
        self
    }

    pub fn code(&self) -> &str {
        &self.error.code
    }

    pub fn message(&self) -> &str {
        &self.error.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.message.fmt(f)
    }
}

impl std::error::Error for ResponseError {}

impl<T> From<T> for ResponseError
where
    T: std::error::Error + ErrorCode,
{
    fn from(other: T) -> Self {
        let mut error = Self::from_msg(other.to_string(), other.error_code());
        if INCLUDE_INNER_ERROR.load(Ordering::Relaxed) {
            let mut chain = Vec::new();
            let mut source = std::error::Error::source(&other);
            while let Some(inner) = source {
                chain.push(inner.to_string());
                source = inner.source();
            }
            if !chain.is_empty() {
                error = error.with_inner_error(serde_json::json!({ "chain": chain }));
            }
        }
        error
    }
}

impl aweb::error::ResponseError for ResponseError {
    fn error_response(&self) -> aweb::HttpResponse {
        let mut this = self.clone();
        if !INCLUDE_INNER_ERROR.load(Ordering::Relaxed) {
            this.error.innererror = None;
        }
        let json = serde_json::to_vec(&this).unwrap();
        HttpResponseBuilder::new(self.status).content_type("application/json").body(json)
    }

    fn status_code(&self) -> StatusCode {
        self.status
    }
}

pub trait ErrorCode {
    fn error_code(&self) -> Code;

    /// returns the HTTP status code associated with the error
    fn http_status(&self) -> StatusCode {
        self.error_code().http()
    }
}

/// Implement all the wire error codes.
///
/// Makes an enum `Code` where each code is a variant carrying its HTTP
/// status; the wire name is the variant name verbatim, matching the
/// emulated service.
macro_rules! make_error_codes {
    ($($code_ident:ident => $status:ident);* $(;)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Code {
            $($code_ident),*
        }

        impl Code {
            /// return the HTTP status code associated with the `Code`
            pub fn http(&self) -> StatusCode {
                match self {
                    $(Code::$code_ident => StatusCode::$status),*
                }
            }

            /// return the name used as the wire error code
            pub fn name(&self) -> &'static str {
                match self {
                    $(Code::$code_ident => stringify!($code_ident)),*
                }
            }
        }
    };
}

make_error_codes! {
    InvalidArgument => BAD_REQUEST;
    InvalidFilter => BAD_REQUEST;
    InvalidApiKey => UNAUTHORIZED;
    Forbidden => FORBIDDEN;
    ResourceNotFound => NOT_FOUND;
    ResourceAlreadyExists => CONFLICT;
    OperationNotAllowed => CONFLICT;
    UpstreamFailure => BAD_GATEWAY;
    UpstreamTimeout => GATEWAY_TIMEOUT;
    ServiceUnavailable => SERVICE_UNAVAILABLE;
    InternalServerError => INTERNAL_SERVER_ERROR;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let error = ResponseError::from_msg(
            "Index 'hotels' was not found.".to_string(),
            Code::ResourceNotFound,
        )
        .with_target("hotels");

        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        insta::assert_snapshot!(serde_json::to_string(&error).unwrap(), @r###"{"error":{"code":"ResourceNotFound","message":"Index 'hotels' was not found.","target":"hotels"}}"###);
    }

    #[test]
    fn code_statuses() {
        assert_eq!(Code::InvalidFilter.http(), StatusCode::BAD_REQUEST);
        assert_eq!(Code::InvalidApiKey.http(), StatusCode::UNAUTHORIZED);
        assert_eq!(Code::OperationNotAllowed.http(), StatusCode::CONFLICT);
        assert_eq!(Code::ResourceAlreadyExists.http(), StatusCode::CONFLICT);
        assert_eq!(Code::InvalidArgument.name(), "InvalidArgument");
    }
}

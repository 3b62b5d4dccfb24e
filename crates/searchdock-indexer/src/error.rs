use searchdock_types::error::{Code, ErrorCode};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} `{1}` was not found.")]
    ResourceNotFound(&'static str, String),
    #[error("Indexer `{0}` is already running.")]
    AlreadyRunning(String),
    #[error("Indexer `{0}` is disabled.")]
    Disabled(String),
    #[error("No connector is registered for data source type `{0}`.")]
    UnknownConnectorType(String),
    #[error("The data source connection failed: {0}")]
    Connector(String),
    #[error("{0}")]
    InvalidDefinition(String),
    #[error(transparent)]
    Store(#[from] searchdock_store::Error),
    #[error(transparent)]
    Core(#[from] searchdock_core::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ErrorCode for Error {
    fn error_code(&self) -> Code {
        match self {
            Error::ResourceNotFound(..) => Code::ResourceNotFound,
            Error::AlreadyRunning(_) | Error::Disabled(_) => Code::OperationNotAllowed,
            Error::UnknownConnectorType(_) | Error::InvalidDefinition(_) => Code::InvalidArgument,
            Error::Connector(_) => Code::UpstreamFailure,
            Error::Core(e) => e.error_code(),
            Error::Store(_) | Error::Json(_) | Error::Io(_) => Code::InternalServerError,
        }
    }
}

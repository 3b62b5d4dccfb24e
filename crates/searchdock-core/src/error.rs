use searchdock_types::error::{Code, ErrorCode};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    InvalidFilter(String),
    #[error("Index `{0}` was not found.")]
    IndexNotFound(String),
    #[error("Document with key `{0}` was not found.")]
    DocumentNotFound(String),
    #[error("Unknown field `{0}` in index `{1}`.")]
    UnknownField(String, String),
    #[error("The vector query against field `{field}` has {got} dimensions; the field declares {expected}.")]
    VectorDimensionMismatch { field: String, expected: usize, got: usize },
    #[error(transparent)]
    Tantivy(#[from] tantivy::TantivyError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("could not read the vector snapshot: {0}")]
    VectorSnapshot(#[from] bincode::Error),
}

impl ErrorCode for Error {
    fn error_code(&self) -> Code {
        match self {
            Error::InvalidArgument(_)
            | Error::UnknownField(..)
            | Error::VectorDimensionMismatch { .. } => Code::InvalidArgument,
            Error::InvalidFilter(_) => Code::InvalidFilter,
            Error::IndexNotFound(_) | Error::DocumentNotFound(_) => Code::ResourceNotFound,
            Error::Tantivy(_) | Error::Io(_) | Error::Json(_) | Error::VectorSnapshot(_) => {
                Code::InternalServerError
            }
        }
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for Error {
    fn from(error: tantivy::directory::error::OpenDirectoryError) -> Self {
        Error::Tantivy(error.into())
    }
}

impl From<tantivy::query::QueryParserError> for Error {
    fn from(error: tantivy::query::QueryParserError) -> Self {
        Error::InvalidArgument(format!("The search text is not a valid full query: {error}."))
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("resource {0:?} is not registered")]
    ResourceNotFound(String),
    #[error("{0:?} is a read-only resource path and cannot be opened for writing")]
    ResourceIsReadOnly(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

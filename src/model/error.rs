use std::io;

use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    /// Wraps a local filesystem error, keeping a missing file distinguishable.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound(format!("local file: {}", path));
        }

        StoreError::Io {
            message: format!("failed on local file: {}", path),
            source: err,
        }
    }

    /// Classifies an SDK error by S3 error code, then by HTTP status.
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>, context: &str) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        let message = format!("{}: {}", context, DisplayErrorContext(&err));

        match &err {
            SdkError::ConstructionFailure(_) => StoreError::InvalidArgument(message),
            SdkError::TimeoutError(_)
            | SdkError::DispatchFailure(_)
            | SdkError::ResponseError(_) => StoreError::Transport(message),
            SdkError::ServiceError(svc) => {
                let status = svc.raw().status().as_u16();
                classify(svc.err().code(), status, message)
            }
            _ => StoreError::Storage(message),
        }
    }
}

pub(crate) fn classify(code: Option<&str>, status: u16, message: String) -> StoreError {
    match code {
        Some("NoSuchBucket") | Some("NoSuchKey") | Some("NotFound") => {
            StoreError::NotFound(message)
        }
        Some("BucketAlreadyOwnedByYou") => StoreError::AlreadyExists(message),
        // owned by another account, the caller cannot use it
        Some("BucketAlreadyExists")
        | Some("AccessDenied")
        | Some("InvalidAccessKeyId")
        | Some("SignatureDoesNotMatch") => StoreError::Permission(message),
        Some("InvalidBucketName") | Some("KeyTooLongError") | Some("InvalidArgument") => {
            StoreError::InvalidArgument(message)
        }
        _ => match status {
            404 => StoreError::NotFound(message),
            401 | 403 => StoreError::Permission(message),
            _ => StoreError::Storage(message),
        },
    }
}

//! Generic filesystem error taxonomy / 通用文件系统错误分类
//!
//! Every driver maps its native failures onto these kinds so callers can
//! distinguish a missing file from a permission problem without knowing
//! which protocol sits underneath.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    /// The filesystem could not be constructed / 文件系统创建失败
    #[error("unable to create filesystem: {msg}")]
    CreateFailed { msg: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("resource not found: {path}")]
    ResourceNotFound { path: String },

    #[error("path should be a directory: {path}")]
    DirectoryExpected { path: String },

    #[error("path should be a file: {path}")]
    FileExpected { path: String },

    #[error("directory exists: {path}")]
    DirectoryExists { path: String },

    #[error("destination exists: {path}")]
    DestinationExists { path: String },

    #[error("directory is not empty: {path}")]
    DirectoryNotEmpty { path: String },

    /// Removing `/` is never allowed / 不允许删除根目录
    #[error("root directory may not be removed")]
    RemoveRootError,

    /// Catch-all for transport/protocol failures on a well-formed request
    #[error("operation failed on {path}: {msg}")]
    OperationFailed { path: String, msg: String },

    /// Local contract violation, no request was sent / 参数错误
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not open for reading")]
    NotReadable,

    #[error("file not open for writing")]
    NotWritable,

    #[error("I/O operation on closed file")]
    FileClosed,

    #[error("no driver registered for scheme '{0}'")]
    UnsupportedProtocol(String),

    #[error("invalid filesystem URL: {0}")]
    InvalidUrl(String),
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::ResourceNotFound { path: path.into() }
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        FsError::PermissionDenied { path: path.into() }
    }

    pub fn operation_failed(path: impl Into<String>, msg: impl ToString) -> Self {
        FsError::OperationFailed {
            path: path.into(),
            msg: msg.to_string(),
        }
    }

    pub fn create_failed(msg: impl ToString) -> Self {
        FsError::CreateFailed { msg: msg.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::ResourceNotFound { .. })
    }
}

pub type FsResult<T> = Result<T, FsError>;

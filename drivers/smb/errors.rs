//! Native error -> generic error kind / 协议错误映射
//!
//! Applied at the boundary of every public operation, after any session
//! retry has already happened.

use super::client::{NtStatus, SmbError};
use crate::storage::FsError;

/// Operation a failure happened in, decides context-dependent kinds / 操作上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Filesystem construction / 创建文件系统
    Connect,
    Stat,
    List,
    Open,
    MakeDir,
    RemoveDir,
    Remove,
    Rename,
    Io,
}

pub fn map_error(err: SmbError, op: Op, path: &str) -> FsError {
    let path = path.to_string();

    if op == Op::Connect {
        return FsError::CreateFailed { msg: err.to_string() };
    }

    match err {
        SmbError::OperationFailure { status, message } => match status {
            NtStatus::ACCESS_DENIED | NtStatus::NETWORK_ACCESS_DENIED | NtStatus::CANNOT_DELETE => {
                FsError::PermissionDenied { path }
            }
            NtStatus::OBJECT_NAME_NOT_FOUND
            | NtStatus::OBJECT_PATH_NOT_FOUND
            | NtStatus::NO_SUCH_FILE
            | NtStatus::BAD_NETWORK_NAME => FsError::ResourceNotFound { path },
            NtStatus::OBJECT_NAME_COLLISION => match op {
                Op::MakeDir => FsError::DirectoryExists { path },
                _ => FsError::DestinationExists { path },
            },
            NtStatus::NOT_A_DIRECTORY => FsError::DirectoryExpected { path },
            NtStatus::FILE_IS_A_DIRECTORY => FsError::FileExpected { path },
            NtStatus::DIRECTORY_NOT_EMPTY => FsError::DirectoryNotEmpty { path },
            _ => FsError::OperationFailed {
                path,
                msg: format!("{}: {}", status, message),
            },
        },
        other => FsError::OperationFailed {
            path,
            msg: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: NtStatus) -> SmbError {
        SmbError::status(code, "test")
    }

    #[test]
    fn test_status_table() {
        assert!(matches!(
            map_error(status(NtStatus::ACCESS_DENIED), Op::Open, "/a"),
            FsError::PermissionDenied { .. }
        ));
        assert!(matches!(
            map_error(status(NtStatus::OBJECT_NAME_NOT_FOUND), Op::Stat, "/a"),
            FsError::ResourceNotFound { .. }
        ));
        assert!(matches!(
            map_error(status(NtStatus::OBJECT_PATH_NOT_FOUND), Op::Open, "/a"),
            FsError::ResourceNotFound { .. }
        ));
        assert!(matches!(
            map_error(status(NtStatus::NOT_A_DIRECTORY), Op::List, "/a"),
            FsError::DirectoryExpected { .. }
        ));
        assert!(matches!(
            map_error(status(NtStatus::FILE_IS_A_DIRECTORY), Op::Open, "/a"),
            FsError::FileExpected { .. }
        ));
        assert!(matches!(
            map_error(status(NtStatus::DIRECTORY_NOT_EMPTY), Op::RemoveDir, "/a"),
            FsError::DirectoryNotEmpty { .. }
        ));
    }

    #[test]
    fn test_collision_depends_on_operation() {
        assert!(matches!(
            map_error(status(NtStatus::OBJECT_NAME_COLLISION), Op::MakeDir, "/a"),
            FsError::DirectoryExists { .. }
        ));
        assert!(matches!(
            map_error(status(NtStatus::OBJECT_NAME_COLLISION), Op::Rename, "/a"),
            FsError::DestinationExists { .. }
        ));
    }

    #[test]
    fn test_unclassified_failures() {
        let err = map_error(status(NtStatus::SHARING_VIOLATION), Op::Open, "/a");
        assert!(matches!(err, FsError::OperationFailed { .. }));

        let err = map_error(SmbError::Timeout, Op::Io, "/a");
        assert!(matches!(err, FsError::OperationFailed { .. }));

        // A reconnect failing mid-operation is not a construction failure
        let err = map_error(SmbError::ConnectionSetup("refused".into()), Op::Open, "/a");
        assert!(matches!(err, FsError::OperationFailed { .. }));
    }

    #[test]
    fn test_construction_failures_are_create_failed() {
        let err = map_error(SmbError::ConnectionSetup("no route".into()), Op::Connect, "/");
        assert!(matches!(err, FsError::CreateFailed { .. }));
        let err = map_error(status(NtStatus::LOGON_FAILURE), Op::Connect, "/");
        assert!(matches!(err, FsError::CreateFailed { .. }));
    }
}

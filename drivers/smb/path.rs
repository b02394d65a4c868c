//! Virtual path -> (share, in-share path) / 路径解析
//!
//! `/` is the server root, its children are shares and everything below
//! lives inside a share. Share existence is checked where the path is
//! used, not here.

use super::errors::{map_error, Op};
use super::session::SessionManager;
use crate::storage::{FsError, FsResult};
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The server root / 根
    Root,
    /// `path` is `/` for the share itself / 共享内路径
    Share { share: String, path: String },
}

impl Resolved {
    /// `/share` with nothing below it / 共享层级
    pub fn is_share_level(&self) -> bool {
        matches!(self, Resolved::Share { path, .. } if path == "/")
    }
}

pub fn resolve(path: &str) -> Resolved {
    let segments = utils::segments(path);
    match segments.split_first() {
        None => Resolved::Root,
        Some((share, rest)) => Resolved::Share {
            share: share.clone(),
            path: format!("/{}", rest.join("/")),
        },
    }
}

/// Virtual path of an in-share path / 还原虚拟路径
pub fn virtual_path(share: &str, path: &str) -> String {
    utils::join(&format!("/{}", share), path.trim_start_matches('/'))
}

/// The parent of `path` inside `share` must be an existing directory / 校验父目录
///
/// The share root counts as a directory; a missing share is reported by
/// the operation that follows.
pub async fn check_parent(sessions: &SessionManager, share: &str, path: &str) -> FsResult<()> {
    let (parent, _) = utils::split(path);
    if parent == "/" {
        return Ok(());
    }
    let shown = virtual_path(share, &parent);
    match sessions.get_attributes(share, &parent).await {
        Ok(record) if record.is_directory => Ok(()),
        Ok(_) => Err(FsError::DirectoryExpected { path: shown }),
        Err(e) => {
            let err = map_error(e, Op::Stat, &shown);
            if err.is_not_found() {
                if let Some(file) = file_ancestor(sessions, share, &parent).await {
                    return Err(FsError::DirectoryExpected { path: file });
                }
            }
            Err(err)
        }
    }
}

/// First ancestor of `path` that exists but is a file / 查找作为文件的祖先
async fn file_ancestor(sessions: &SessionManager, share: &str, path: &str) -> Option<String> {
    let mut current = String::from("/");
    for segment in utils::segments(path) {
        current = utils::join(&current, &segment);
        match sessions.get_attributes(share, &current).await {
            Ok(record) if record.is_directory => continue,
            Ok(_) => return Some(virtual_path(share, &current)),
            Err(_) => return None,
        }
    }
    None
}

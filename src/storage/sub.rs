//! Sub-directory view / 子目录视图
//!
//! Exposes a directory of another filesystem as its own root, the same way
//! mount paths are stripped before a request reaches a driver.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{BinaryFile, DriverBox, FileSystem, FsError, FsResult, Info, Namespace, OpenMode};
use crate::utils;

pub struct SubFs {
    parent: DriverBox,
    prefix: String,
}

impl SubFs {
    /// Open `path` of `parent` as a filesystem, the directory must exist / 打开子目录
    pub async fn open(parent: DriverBox, path: &str) -> FsResult<Self> {
        let prefix = utils::fix_and_clean_path(path);
        let info = parent.getinfo(&prefix, &[]).await?;
        if !info.is_dir() {
            return Err(FsError::DirectoryExpected { path: prefix });
        }
        tracing::debug!("SubFs opened at {}", prefix);
        Ok(Self { parent, prefix })
    }

    /// Directory of the parent filesystem this view is rooted at / 根路径
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The wrapped filesystem / 父文件系统
    pub fn delegate_fs(&self) -> &DriverBox {
        &self.parent
    }

    fn full_path(&self, path: &str) -> String {
        let relative = utils::fix_and_clean_path(path);
        utils::join(&self.prefix, relative.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileSystem for SubFs {
    async fn getinfo(&self, path: &str, namespaces: &[Namespace]) -> FsResult<Info> {
        let mut info = self.parent.getinfo(&self.full_path(path), namespaces).await?;
        if utils::fix_and_clean_path(path) == "/" {
            info.basic.name = String::new();
        }
        Ok(info)
    }

    async fn scandir(&self, path: &str, namespaces: &[Namespace]) -> FsResult<Vec<Info>> {
        self.parent.scandir(&self.full_path(path), namespaces).await
    }

    async fn openbin(&self, path: &str, mode: OpenMode) -> FsResult<Box<dyn BinaryFile>> {
        self.parent.openbin(&self.full_path(path), mode).await
    }

    async fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        self.parent.makedir(&self.full_path(path), recreate).await
    }

    async fn removedir(&self, path: &str) -> FsResult<()> {
        if utils::fix_and_clean_path(path) == "/" {
            return Err(FsError::RemoveRootError);
        }
        self.parent.removedir(&self.full_path(path)).await
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        if utils::fix_and_clean_path(path) == "/" {
            return Err(FsError::RemoveRootError);
        }
        self.parent.remove(&self.full_path(path)).await
    }

    async fn move_item(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        self.parent
            .move_item(&self.full_path(src), &self.full_path(dst), overwrite)
            .await
    }

    async fn upload(&self, path: &str, source: &mut (dyn AsyncRead + Unpin + Send)) -> FsResult<u64> {
        self.parent.upload(&self.full_path(path), source).await
    }

    async fn download(&self, path: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> FsResult<u64> {
        self.parent.download(&self.full_path(path), sink).await
    }

    async fn close(&self) -> FsResult<()> {
        self.parent.close().await
    }
}

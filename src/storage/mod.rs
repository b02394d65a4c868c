use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::utils;

pub mod error;
pub mod info;
pub mod mode;

pub use error::{FsError, FsResult};
pub use info::{
    AccessInfo, BasicInfo, Info, Namespace, NamespaceSet, Permissions, ResourceType, SmbInfo,
};
pub use mode::OpenMode;

/// Default chunk size for streamed transfers / 默认传输分块大小
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Open binary file handle / 二进制文件句柄
#[async_trait]
pub trait BinaryFile: Send {
    /// Mode the handle was opened with / 打开模式
    fn mode(&self) -> OpenMode;

    /// Current logical offset / 当前偏移
    fn tell(&self) -> u64;

    fn is_closed(&self) -> bool;

    /// Read up to `size` bytes (`None` reads to end of file) / 读取数据
    async fn read(&mut self, size: Option<usize>) -> FsResult<Bytes>;

    /// Read into a caller-supplied buffer / 读取到调用方缓冲区
    async fn read_into(&mut self, buf: &mut [u8]) -> FsResult<usize>;

    /// Write at the current offset / 在当前偏移写入
    async fn write(&mut self, data: &[u8]) -> FsResult<usize>;

    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64>;

    /// Release the handle (idempotent) / 关闭句柄
    async fn close(&mut self) -> FsResult<()>;

    async fn write_all(&mut self, mut data: &[u8]) -> FsResult<()> {
        while !data.is_empty() {
            let n = self.write(data).await?;
            if n == 0 {
                return Err(FsError::InvalidArgument("write returned zero bytes".to_string()));
            }
            data = &data[n..];
        }
        Ok(())
    }
}

/// Generic filesystem interface (provides primitive operations) / 通用文件系统接口
///
/// Paths are virtual, slash separated and rooted at `/`.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Get resource info / 获取资源信息
    async fn getinfo(&self, path: &str, namespaces: &[Namespace]) -> FsResult<Info>;

    /// List directory contents with info / 列出目录内容
    async fn scandir(&self, path: &str, namespaces: &[Namespace]) -> FsResult<Vec<Info>>;

    /// Open binary file / 打开二进制文件
    async fn openbin(&self, path: &str, mode: OpenMode) -> FsResult<Box<dyn BinaryFile>>;

    /// Create directory / 创建目录
    async fn makedir(&self, path: &str, recreate: bool) -> FsResult<()>;

    /// Remove empty directory / 删除空目录
    async fn removedir(&self, path: &str) -> FsResult<()>;

    /// Remove file / 删除文件
    async fn remove(&self, path: &str) -> FsResult<()>;

    /// Move file / 移动文件
    async fn move_item(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()>;

    /// Bytes per write when uploading / 上传分块大小
    async fn upload_chunk_size(&self, _path: &str) -> FsResult<usize> {
        Ok(DEFAULT_CHUNK_SIZE)
    }

    /// Bytes per read when downloading / 下载分块大小
    async fn download_chunk_size(&self, _path: &str) -> FsResult<usize> {
        Ok(DEFAULT_CHUNK_SIZE)
    }

    /// Upload from a byte source, returns bytes written / 上传
    async fn upload(&self, path: &str, source: &mut (dyn AsyncRead + Unpin + Send)) -> FsResult<u64> {
        let mut file = self.openbin(path, OpenMode::write()).await?;
        let mut buf = vec![0u8; self.upload_chunk_size(path).await?.max(1)];
        let mut total = 0u64;
        loop {
            let n = source
                .read(&mut buf)
                .await
                .map_err(|e| FsError::operation_failed(path, e))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            total += n as u64;
            tracing::trace!("upload {} at {} bytes", path, total);
        }
        file.close().await?;
        tracing::debug!("upload: {} ({} bytes)", path, total);
        Ok(total)
    }

    /// Download into a byte sink, returns bytes read / 下载
    async fn download(&self, path: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> FsResult<u64> {
        let mut file = self.openbin(path, OpenMode::read()).await?;
        let chunk_size = self.download_chunk_size(path).await?.max(1);
        let mut total = 0u64;
        loop {
            let chunk = file.read(Some(chunk_size)).await?;
            if chunk.is_empty() {
                break;
            }
            sink.write_all(&chunk)
                .await
                .map_err(|e| FsError::operation_failed(path, e))?;
            total += chunk.len() as u64;
            tracing::trace!("download {} at {} bytes", path, total);
        }
        sink.flush().await.map_err(|e| FsError::operation_failed(path, e))?;
        file.close().await?;
        tracing::debug!("download: {} ({} bytes)", path, total);
        Ok(total)
    }

    /// Release the underlying connection / 释放连接
    async fn close(&self) -> FsResult<()> {
        Ok(())
    }

    async fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        let entries = self.scandir(path, &[]).await?;
        Ok(entries.into_iter().map(|info| info.basic.name).collect())
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        match self.getinfo(path, &[]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn isdir(&self, path: &str) -> FsResult<bool> {
        match self.getinfo(path, &[]).await {
            Ok(info) => Ok(info.is_dir()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn isfile(&self, path: &str) -> FsResult<bool> {
        match self.getinfo(path, &[]).await {
            Ok(info) => Ok(info.is_file()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn gettype(&self, path: &str) -> FsResult<ResourceType> {
        Ok(self.getinfo(path, &[]).await?.kind())
    }

    async fn getsize(&self, path: &str) -> FsResult<u64> {
        Ok(self.getinfo(path, &[]).await?.size())
    }

    /// Create an empty file if it does not exist / 创建空文件
    async fn touch(&self, path: &str) -> FsResult<()> {
        if self.exists(path).await? {
            return Ok(());
        }
        let mut file = self.openbin(path, OpenMode::append()).await?;
        file.close().await
    }

    /// Create a directory and any missing ancestors / 递归创建目录
    async fn makedirs(&self, path: &str, recreate: bool) -> FsResult<()> {
        let segments = utils::segments(path);
        let mut current = String::from("/");
        for (i, segment) in segments.iter().enumerate() {
            current = utils::join(&current, segment);
            if i + 1 == segments.len() {
                break;
            }
            match self.getinfo(&current, &[]).await {
                Ok(info) if info.is_dir() => continue,
                Ok(_) => return Err(FsError::DirectoryExpected { path: current }),
                Err(e) if e.is_not_found() => self.makedir(&current, true).await?,
                Err(e) => return Err(e),
            }
        }
        self.makedir(&current, recreate).await
    }

    async fn read_bytes(&self, path: &str) -> FsResult<Bytes> {
        let mut file = self.openbin(path, OpenMode::read()).await?;
        let data = file.read(None).await?;
        file.close().await?;
        Ok(data)
    }

    async fn write_bytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let mut file = self.openbin(path, OpenMode::write()).await?;
        file.write_all(data).await?;
        file.close().await
    }

    async fn read_text(&self, path: &str) -> FsResult<String> {
        let data = self.read_bytes(path).await?;
        String::from_utf8(data.to_vec())
            .map_err(|_| FsError::InvalidArgument(format!("{} is not valid UTF-8", path)))
    }

    async fn write_text(&self, path: &str, text: &str) -> FsResult<()> {
        self.write_bytes(path, text.as_bytes()).await
    }
}

pub mod manager;
pub mod sub;

pub use manager::{DriverBox, DriverFactory, StorageManager};
pub use sub::SubFs;

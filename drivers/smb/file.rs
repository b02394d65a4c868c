//! Remote file handle / 远程文件句柄

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use std::sync::Arc;

use super::client::{Access, Disposition, FileId, SmbError};
use super::errors::{map_error, Op};
use super::session::SessionManager;
use crate::storage::{BinaryFile, FsError, FsResult, OpenMode};

/// Open disposition for a mode / 打开方式
pub fn disposition_for(mode: OpenMode) -> Disposition {
    if mode.exclusive {
        Disposition::Create
    } else if mode.truncate {
        Disposition::OverwriteIf
    } else if mode.appending || mode.create {
        Disposition::OpenIf
    } else {
        Disposition::Open
    }
}

pub struct SmbFile {
    sessions: Arc<SessionManager>,
    /// Session generation the identifier belongs to / 句柄所属会话代数
    generation: u64,
    fid: FileId,
    /// Virtual path, for error reporting / 虚拟路径
    path: String,
    mode: OpenMode,
    position: u64,
    /// Length as far as this handle knows / 缓存长度
    length: u64,
    max_read: usize,
    max_write: usize,
    closed: bool,
}

impl SmbFile {
    /// Open `path` in `share`; ancestor and root checks are the caller's job / 打开远程文件
    pub async fn open(
        sessions: Arc<SessionManager>,
        share: &str,
        path: &str,
        vpath: &str,
        mode: OpenMode,
    ) -> FsResult<Self> {
        let access = Access {
            read: mode.reading,
            write: mode.is_writing(),
        };
        let capabilities = sessions
            .capabilities()
            .await
            .map_err(|e| map_error(e, Op::Open, vpath))?;
        let (opened, generation) = sessions
            .open(share, path, disposition_for(mode), access)
            .await
            .map_err(|e| map_error(e, Op::Open, vpath))?;

        tracing::debug!("SMB: opened {} ({}) as {}", vpath, mode, opened.fid);
        Ok(Self {
            sessions,
            generation,
            fid: opened.fid,
            path: vpath.to_string(),
            mode,
            position: if mode.appending { opened.size } else { 0 },
            length: opened.size,
            max_read: capabilities.max_read_size.max(1),
            max_write: capabilities.max_write_size.max(1),
            closed: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn check_open(&self) -> FsResult<()> {
        if self.closed {
            return Err(FsError::FileClosed);
        }
        Ok(())
    }

    async fn fail(&self, err: SmbError) -> FsError {
        // an unexpected reply may leave the stream out of step
        if matches!(err, SmbError::Protocol(_)) {
            self.sessions.validate().await;
        }
        map_error(err, Op::Io, &self.path)
    }

    /// Read up to `limit` bytes, or to end of file / 读取到上限或文件尾
    async fn read_at_most(&mut self, limit: Option<usize>) -> FsResult<Bytes> {
        let mut out = BytesMut::new();
        loop {
            let want = match limit {
                Some(limit) if out.len() >= limit => break,
                Some(limit) => (limit - out.len()).min(self.max_read),
                None => self.max_read,
            };
            let chunk = match self
                .sessions
                .read(self.generation, self.fid, self.position, want)
                .await
            {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(e).await),
            };
            if chunk.is_empty() {
                break;
            }
            // never take more than was asked for
            let chunk = chunk.slice(..chunk.len().min(want));
            self.position += chunk.len() as u64;
            out.extend_from_slice(&chunk);
        }
        tracing::trace!("SMB: read {} bytes from {}", out.len(), self.path);
        Ok(out.freeze())
    }

    async fn end_offset(&mut self) -> FsResult<u64> {
        if !self.mode.reading {
            return Ok(self.length);
        }
        match self.sessions.query_size(self.generation, self.fid).await {
            Ok(size) => {
                self.length = size;
                Ok(size)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }
}

#[async_trait]
impl BinaryFile for SmbFile {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn read(&mut self, size: Option<usize>) -> FsResult<Bytes> {
        self.check_open()?;
        if !self.mode.reading {
            return Err(FsError::NotReadable);
        }
        self.read_at_most(size).await
    }

    async fn read_into(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        self.check_open()?;
        if !self.mode.reading {
            return Err(FsError::NotReadable);
        }
        let data = self.read_at_most(Some(buf.len())).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        self.check_open()?;
        if !self.mode.is_writing() {
            return Err(FsError::NotWritable);
        }
        if self.mode.appending {
            self.position = self.length;
        }
        for chunk in data.chunks(self.max_write) {
            let mut chunk = Bytes::copy_from_slice(chunk);
            while !chunk.is_empty() {
                let written = match self
                    .sessions
                    .write(self.generation, self.fid, self.position, chunk.clone())
                    .await
                {
                    Ok(0) => {
                        return Err(FsError::operation_failed(&self.path, "server accepted no data"))
                    }
                    Ok(n) => n.min(chunk.len()),
                    Err(e) => return Err(self.fail(e).await),
                };
                self.position += written as u64;
                self.length = self.length.max(self.position);
                let _ = chunk.split_to(written);
            }
        }
        tracing::trace!("SMB: wrote {} bytes to {}", data.len(), self.path);
        Ok(data.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            // relative moves stop at the start of the file
            SeekFrom::Current(delta) => Some(self.position.saturating_add_signed(delta)),
            SeekFrom::End(delta) if delta > 0 => {
                return Err(FsError::InvalidArgument(format!(
                    "seek past the end of {}, use an absolute offset",
                    self.path
                )))
            }
            SeekFrom::End(delta) => self.end_offset().await?.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.position = offset;
                Ok(offset)
            }
            None => Err(FsError::InvalidArgument(format!(
                "seek to a negative position in {}",
                self.path
            ))),
        }
    }

    async fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sessions.close_file(self.generation, self.fid).await {
            Ok(()) => Ok(()),
            // the identifier died with its session, nothing left to release
            Err(e) if e.is_dead_session() || matches!(e, SmbError::StaleHandle) => {
                tracing::debug!("SMB: {} closed after session loss", self.path);
                Ok(())
            }
            Err(e) => Err(map_error(e, Op::Io, &self.path)),
        }
    }
}

impl Drop for SmbFile {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("SMB: {} dropped without close outside a runtime", self.path);
            return;
        };
        let sessions = self.sessions.clone();
        let (generation, fid, path) = (self.generation, self.fid, self.path.clone());
        runtime.spawn(async move {
            if let Err(e) = sessions.close_file(generation, fid).await {
                tracing::debug!("SMB: deferred close of {} failed: {}", path, e);
            }
        });
    }
}

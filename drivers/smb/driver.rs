//! SMB filesystem driver / SMB 文件系统驱动
//!
//! Presents a whole server as one tree: `/` lists the disk shares, and
//! everything below a share maps onto paths inside it.

use async_trait::async_trait;
use std::sync::Arc;

use super::client::{Capabilities, NtStatus, SecurityDescriptor, ShareInfo, ShareKind, SmbConnector, SmbError};
use super::errors::{map_error, Op};
use super::file::SmbFile;
use super::info::{entry_info, root_info, share_info};
use super::path::{check_parent, resolve, virtual_path, Resolved};
use super::resolver::NameResolver;
use super::session::{SessionManager, SessionSettings};
use super::transfer;
use crate::storage::{
    BinaryFile, DriverBox, FileSystem, FsError, FsResult, Info, Namespace, NamespaceSet, OpenMode,
    SubFs,
};
use crate::utils;

pub struct SmbFs {
    sessions: Arc<SessionManager>,
}

impl SmbFs {
    /// Connect and log in right away; any failure is `CreateFailed` / 建立连接
    pub async fn connect(
        settings: SessionSettings,
        connector: Arc<dyn SmbConnector>,
        names: Arc<dyn NameResolver>,
    ) -> FsResult<Self> {
        let host = settings.host.clone();
        let sessions = Arc::new(SessionManager::new(settings, connector, names));
        sessions
            .ensure()
            .await
            .map_err(|e| map_error(e, Op::Connect, "/"))?;
        tracing::info!("SMB filesystem ready: {:?}", host);
        Ok(Self { sessions })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// View of a directory as its own filesystem / 打开子目录视图
    pub async fn opendir(self: &Arc<Self>, path: &str) -> FsResult<SubFs> {
        let parent: DriverBox = self.clone();
        SubFs::open(parent, path).await
    }

    async fn capabilities(&self, path: &str) -> FsResult<Capabilities> {
        self.sessions
            .capabilities()
            .await
            .map_err(|e| map_error(e, Op::Stat, path))
    }

    /// Share by name, `None` when the server has no such disk share / 查找共享
    async fn find_share(&self, name: &str) -> FsResult<Option<ShareInfo>> {
        let shares = self
            .sessions
            .list_shares()
            .await
            .map_err(|e| map_error(e, Op::List, "/"))?;
        Ok(shares
            .into_iter()
            .find(|s| s.kind == ShareKind::Disk && s.name.eq_ignore_ascii_case(name)))
    }

    /// Security descriptor, `None` where the dialect or our rights don't allow it / 安全描述符
    async fn security(&self, share: &str, path: &str) -> FsResult<Option<SecurityDescriptor>> {
        let shown = virtual_path(share, path);
        if !self.capabilities(&shown).await?.security_descriptors {
            return Ok(None);
        }
        match self.sessions.get_security(share, path).await {
            Ok(sd) => Ok(Some(sd)),
            Err(SmbError::NotReady(reason)) => {
                tracing::debug!("SMB: no access info for {}: {}", shown, reason);
                Ok(None)
            }
            Err(e) if e.nt_status() == Some(NtStatus::ACCESS_DENIED) => {
                tracing::debug!("SMB: security descriptor of {} not readable", shown);
                Ok(None)
            }
            Err(e) => Err(map_error(e, Op::Stat, &shown)),
        }
    }

    async fn share_entry(&self, share: &ShareInfo, ns: NamespaceSet) -> FsResult<Info> {
        let sd = if ns.access {
            self.security(&share.name, "/").await?
        } else {
            None
        };
        Ok(share_info(&share.name, ns, sd.as_ref()))
    }

    /// In-share path must not exist as a directory / 校验是文件
    async fn expect_file(&self, share: &str, path: &str, vpath: &str) -> FsResult<()> {
        let record = self
            .sessions
            .get_attributes(share, path)
            .await
            .map_err(|e| map_error(e, Op::Stat, vpath))?;
        if record.is_directory {
            return Err(FsError::FileExpected {
                path: vpath.to_string(),
            });
        }
        Ok(())
    }

    /// Copy across shares, then drop the source / 跨共享移动
    async fn move_across(&self, src: &str, dst: &str) -> FsResult<()> {
        let chunk = self.capabilities(src).await?.max_read_size;
        let mut reader = self.openbin(src, OpenMode::read()).await?;
        let mut writer = self.openbin(dst, OpenMode::write()).await?;
        let copied = transfer::copy_file(reader.as_mut(), writer.as_mut(), chunk).await?;
        writer.close().await?;
        reader.close().await?;
        tracing::debug!("SMB: copied {} bytes from {} to {}", copied, src, dst);
        self.remove(src).await
    }
}

/// In-share location; root and share level are off limits / 共享内位置
fn in_share(path: &str) -> FsResult<(String, String)> {
    match resolve(path) {
        Resolved::Share { share, path: inner } if inner != "/" => Ok((share, inner)),
        _ => Err(FsError::permission_denied(path)),
    }
}

#[async_trait]
impl FileSystem for SmbFs {
    async fn getinfo(&self, path: &str, namespaces: &[Namespace]) -> FsResult<Info> {
        let path = utils::fix_and_clean_path(path);
        let ns = NamespaceSet::from_slice(namespaces);
        tracing::debug!("SMB getinfo: {}", path);

        match resolve(&path) {
            Resolved::Root => Ok(root_info()),
            Resolved::Share { share, path: inner } if inner == "/" => match self.find_share(&share).await? {
                Some(found) => self.share_entry(&found, ns).await,
                None => Err(FsError::not_found(path)),
            },
            Resolved::Share { share, path: inner } => {
                let record = self
                    .sessions
                    .get_attributes(&share, &inner)
                    .await
                    .map_err(|e| map_error(e, Op::Stat, &path))?;
                let sd = if ns.access {
                    self.security(&share, &inner).await?
                } else {
                    None
                };
                Ok(entry_info(&utils::basename(&path), &record, ns, sd.as_ref()))
            }
        }
    }

    async fn scandir(&self, path: &str, namespaces: &[Namespace]) -> FsResult<Vec<Info>> {
        let path = utils::fix_and_clean_path(path);
        let ns = NamespaceSet::from_slice(namespaces);
        tracing::debug!("SMB scandir: {}", path);

        match resolve(&path) {
            Resolved::Root => {
                let shares = self
                    .sessions
                    .list_shares()
                    .await
                    .map_err(|e| map_error(e, Op::List, &path))?;
                let mut entries = Vec::new();
                for share in shares.iter().filter(|s| s.kind == ShareKind::Disk) {
                    entries.push(self.share_entry(share, ns).await?);
                }
                Ok(entries)
            }
            Resolved::Share { share, path: inner } => {
                let records = self
                    .sessions
                    .list_path(&share, &inner)
                    .await
                    .map_err(|e| map_error(e, Op::List, &path))?;
                let mut entries = Vec::with_capacity(records.len());
                for record in records.iter().filter(|r| r.filename != "." && r.filename != "..") {
                    let sd = if ns.access {
                        self.security(&share, &utils::join(&inner, &record.filename)).await?
                    } else {
                        None
                    };
                    entries.push(entry_info(&record.filename, record, ns, sd.as_ref()));
                }
                Ok(entries)
            }
        }
    }

    async fn openbin(&self, path: &str, mode: OpenMode) -> FsResult<Box<dyn BinaryFile>> {
        let path = utils::fix_and_clean_path(path);
        tracing::debug!("SMB openbin: {} ({})", path, mode);

        let (share, inner) = match resolve(&path) {
            Resolved::Root if mode.is_writing() => return Err(FsError::permission_denied(path)),
            Resolved::Root => return Err(FsError::FileExpected { path }),
            Resolved::Share { share, path: inner } if inner == "/" => {
                if mode.is_writing() {
                    return Err(FsError::permission_denied(path));
                }
                return match self.find_share(&share).await? {
                    Some(_) => Err(FsError::FileExpected { path }),
                    None => Err(FsError::not_found(path)),
                };
            }
            Resolved::Share { share, path: inner } => (share, inner),
        };

        if mode.is_writing() {
            check_parent(&self.sessions, &share, &inner).await?;
        }
        let file = SmbFile::open(self.sessions.clone(), &share, &inner, &path, mode).await?;
        Ok(Box::new(file))
    }

    async fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        let path = utils::fix_and_clean_path(path);
        tracing::debug!("SMB makedir: {} (recreate={})", path, recreate);

        match resolve(&path) {
            Resolved::Root if recreate => Ok(()),
            Resolved::Root => Err(FsError::DirectoryExists { path }),
            Resolved::Share { share, path: inner } if inner == "/" => {
                match self.find_share(&share).await? {
                    Some(_) if recreate => Ok(()),
                    Some(_) => Err(FsError::DirectoryExists { path }),
                    // shares are created by the server administrator
                    None => Err(FsError::permission_denied(path)),
                }
            }
            Resolved::Share { share, path: inner } => {
                check_parent(&self.sessions, &share, &inner).await?;
                match self.sessions.create_directory(&share, &inner).await {
                    Ok(()) => Ok(()),
                    Err(e) => match map_error(e, Op::MakeDir, &path) {
                        FsError::DirectoryExists { path } if recreate => {
                            match self.sessions.get_attributes(&share, &inner).await {
                                Ok(record) if record.is_directory => Ok(()),
                                _ => Err(FsError::DirectoryExists { path }),
                            }
                        }
                        other => Err(other),
                    },
                }
            }
        }
    }

    async fn removedir(&self, path: &str) -> FsResult<()> {
        let path = utils::fix_and_clean_path(path);
        tracing::debug!("SMB removedir: {}", path);

        match resolve(&path) {
            Resolved::Root => Err(FsError::RemoveRootError),
            Resolved::Share { path: inner, .. } if inner == "/" => Err(FsError::permission_denied(path)),
            Resolved::Share { share, path: inner } => {
                let record = self
                    .sessions
                    .get_attributes(&share, &inner)
                    .await
                    .map_err(|e| map_error(e, Op::Stat, &path))?;
                if !record.is_directory {
                    return Err(FsError::DirectoryExpected { path });
                }
                self.sessions
                    .delete_directory(&share, &inner)
                    .await
                    .map_err(|e| map_error(e, Op::RemoveDir, &path))
            }
        }
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        let path = utils::fix_and_clean_path(path);
        tracing::debug!("SMB remove: {}", path);

        match resolve(&path) {
            Resolved::Root => Err(FsError::RemoveRootError),
            Resolved::Share { path: inner, .. } if inner == "/" => Err(FsError::permission_denied(path)),
            Resolved::Share { share, path: inner } => {
                self.expect_file(&share, &inner, &path).await?;
                self.sessions
                    .delete_file(&share, &inner)
                    .await
                    .map_err(|e| map_error(e, Op::Remove, &path))
            }
        }
    }

    async fn move_item(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        let src = utils::fix_and_clean_path(src);
        let dst = utils::fix_and_clean_path(dst);
        tracing::debug!("SMB move: {} -> {} (overwrite={})", src, dst, overwrite);

        let (src_share, src_inner) = in_share(&src)?;
        let (dst_share, dst_inner) = in_share(&dst)?;

        check_parent(&self.sessions, &dst_share, &dst_inner).await?;
        self.expect_file(&src_share, &src_inner, &src).await?;

        if src == dst {
            return if overwrite {
                Ok(())
            } else {
                Err(FsError::DestinationExists { path: dst })
            };
        }

        match self.sessions.get_attributes(&dst_share, &dst_inner).await {
            Ok(_) if !overwrite => return Err(FsError::DestinationExists { path: dst }),
            Ok(record) if record.is_directory => return Err(FsError::FileExpected { path: dst }),
            Ok(_) => self
                .sessions
                .delete_file(&dst_share, &dst_inner)
                .await
                .map_err(|e| map_error(e, Op::Remove, &dst))?,
            Err(e) => match map_error(e, Op::Stat, &dst) {
                FsError::ResourceNotFound { .. } => {}
                other => return Err(other),
            },
        }

        if src_share == dst_share {
            self.sessions
                .rename(&src_share, &src_inner, &dst_inner)
                .await
                .map_err(|e| map_error(e, Op::Rename, &dst))
        } else {
            self.move_across(&src, &dst).await
        }
    }

    /// One negotiated write per chunk / 按协商写入大小分块
    async fn upload_chunk_size(&self, path: &str) -> FsResult<usize> {
        Ok(self.capabilities(path).await?.max_write_size)
    }

    async fn download_chunk_size(&self, path: &str) -> FsResult<usize> {
        Ok(self.capabilities(path).await?.max_read_size)
    }

    async fn close(&self) -> FsResult<()> {
        self.sessions.close().await;
        Ok(())
    }
}

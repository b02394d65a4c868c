//! Session manager / 会话管理
//!
//! Owns the single authenticated connection of a filesystem instance. All
//! requests go through the mutex, which also serialises them, so one
//! instance never has two requests in flight.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::client::{
    Access, Capabilities, ConnectParams, Disposition, FileId, OpenedFile, SecurityDescriptor,
    ShareInfo, SharedFile, SmbConnection, SmbConnector, SmbError,
};
use super::resolver::{self, Candidate, HostResolver, HostToken, NameResolver};

/// NetBIOS session service port / NetBIOS 端口
pub const NETBIOS_PORT: u16 = 139;
/// Direct TCP transport port / 直连 TCP 端口
pub const DIRECT_TCP_PORT: u16 = 445;

/// How to reach and log in to the server / 连接参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub host: HostToken,
    pub username: String,
    pub password: String,
    pub domain: String,
    /// Local NetBIOS name sent during session setup / 本地名称
    pub client_name: String,
    /// Explicit port, overrides the transport default / 端口
    pub port: Option<u16>,
    pub direct_tcp: bool,
    pub timeout: Duration,
}

impl SessionSettings {
    pub fn port(&self) -> u16 {
        match (self.port, self.direct_tcp) {
            (Some(port), _) => port,
            (None, true) => DIRECT_TCP_PORT,
            (None, false) => NETBIOS_PORT,
        }
    }
}

/// Session state as seen from outside / 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Never connected, or closed / 未连接
    Absent,
    Live,
    /// Known broken, recreated on next use / 已失效
    Dead,
}

struct Session {
    conn: Box<dyn SmbConnection>,
    generation: u64,
    alive: bool,
    capabilities: Capabilities,
    peer: SocketAddr,
}

#[derive(Default)]
struct SessionSlot {
    session: Option<Session>,
    /// Incremented on every successful login / 每次登录递增
    generation: u64,
}

pub struct SessionManager {
    settings: SessionSettings,
    connector: Arc<dyn SmbConnector>,
    resolver: HostResolver,
    slot: Mutex<SessionSlot>,
}

impl SessionManager {
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn SmbConnector>,
        names: Arc<dyn NameResolver>,
    ) -> Self {
        let resolver = HostResolver::new(names, settings.direct_tcp, settings.timeout);
        Self {
            settings,
            connector,
            resolver,
            slot: Mutex::new(SessionSlot::default()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    pub async fn status(&self) -> SessionStatus {
        let slot = self.slot.lock().await;
        match &slot.session {
            None => SessionStatus::Absent,
            Some(session) if session.alive => SessionStatus::Live,
            Some(_) => SessionStatus::Dead,
        }
    }

    /// Remote address of the live session / 远端地址
    pub async fn peer(&self) -> Option<SocketAddr> {
        let slot = self.slot.lock().await;
        slot.session.as_ref().filter(|s| s.alive).map(|s| s.peer)
    }

    pub async fn generation(&self) -> u64 {
        self.slot.lock().await.generation
    }

    /// Make sure a live session exists / 确保会话可用
    pub async fn ensure(&self) -> Result<Capabilities, SmbError> {
        let mut slot = self.slot.lock().await;
        let session = self.ensure_locked(&mut slot).await?;
        Ok(session.capabilities)
    }

    /// Mark the session dead, it is recreated on next use / 标记会话失效
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        self.invalidate_locked(&mut slot).await;
    }

    /// Probe the live session with an echo / 心跳检测
    pub async fn validate(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let result = match slot.session.as_mut() {
            Some(session) if session.alive => self.run(session, |conn| conn.echo()).await,
            _ => return false,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("SMB: echo failed: {}", e);
                if e.is_dead_session() || matches!(e, SmbError::Timeout) {
                    self.invalidate_locked(&mut slot).await;
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Log off and drop the session / 注销并释放会话
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut session) = slot.session.take() {
            if session.alive {
                match tokio::time::timeout(self.settings.timeout, session.conn.logoff()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!("SMB: logoff failed: {}", e),
                    Err(_) => tracing::debug!("SMB: logoff timed out"),
                }
            }
            tracing::info!("SMB session to {} closed", session.peer);
        }
    }

    /// Run a request on the live session, reconnecting once if it died / 执行请求（断线重试一次）
    pub async fn call<T, F>(&self, f: F) -> Result<T, SmbError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut dyn SmbConnection) -> BoxFuture<'c, Result<T, SmbError>> + Send,
    {
        self.call_tracked(f).await.map(|(value, _)| value)
    }

    /// Like [`call`](Self::call), also returns the generation it ran under / 返回会话代数
    pub async fn call_tracked<T, F>(&self, mut f: F) -> Result<(T, u64), SmbError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut dyn SmbConnection) -> BoxFuture<'c, Result<T, SmbError>> + Send,
    {
        let mut slot = self.slot.lock().await;
        let mut retried = false;
        loop {
            let session = self.ensure_locked(&mut slot).await?;
            let generation = session.generation;
            let result = self.run(session, &mut f).await;
            match result {
                Ok(value) => return Ok((value, generation)),
                Err(e) if e.is_dead_session() && !retried => {
                    tracing::warn!("SMB: session lost ({}), reconnecting", e);
                    self.invalidate_locked(&mut slot).await;
                    retried = true;
                }
                Err(e) => {
                    if e.is_dead_session() || matches!(e, SmbError::Timeout) {
                        self.invalidate_locked(&mut slot).await;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Run a request bound to the session a file was opened under, never reconnects / 绑定会话代数执行
    pub async fn call_pinned<T, F>(&self, generation: u64, f: F) -> Result<T, SmbError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut dyn SmbConnection) -> BoxFuture<'c, Result<T, SmbError>> + Send,
    {
        let mut slot = self.slot.lock().await;
        let result = match slot.session.as_mut() {
            Some(session) if session.alive && session.generation == generation => {
                self.run(session, f).await
            }
            _ => return Err(SmbError::StaleHandle),
        };
        if let Err(e) = &result {
            if e.is_dead_session() || matches!(e, SmbError::Timeout) {
                self.invalidate_locked(&mut slot).await;
            }
        }
        result
    }

    async fn run<T, F>(&self, session: &mut Session, f: F) -> Result<T, SmbError>
    where
        F: for<'c> FnOnce(&'c mut dyn SmbConnection) -> BoxFuture<'c, Result<T, SmbError>>,
    {
        match tokio::time::timeout(self.settings.timeout, f(session.conn.as_mut())).await {
            Ok(result) => result,
            Err(_) => Err(SmbError::Timeout),
        }
    }

    async fn ensure_locked<'s>(&self, slot: &'s mut SessionSlot) -> Result<&'s mut Session, SmbError> {
        let live = matches!(&slot.session, Some(session) if session.alive);
        if !live {
            slot.session = None;
            let conn = self.connect().await?;
            slot.generation += 1;
            let session = Session {
                capabilities: conn.capabilities(),
                peer: conn.peer(),
                generation: slot.generation,
                alive: true,
                conn,
            };
            tracing::info!(
                "SMB session established: {} ({:?}, generation {})",
                session.peer,
                session.capabilities.dialect,
                session.generation
            );
            slot.session = Some(session);
        }
        slot.session
            .as_mut()
            .ok_or_else(|| SmbError::ConnectionSetup("session unavailable".to_string()))
    }

    async fn invalidate_locked(&self, slot: &mut SessionSlot) {
        if let Some(session) = slot.session.as_mut() {
            if session.alive {
                session.alive = false;
                tracing::warn!("SMB session to {} marked dead", session.peer);
                // best effort, the socket is most likely gone already
                let logoff = tokio::time::timeout(self.settings.timeout, session.conn.logoff());
                let _ = logoff.await;
            }
        }
    }

    /// Try every candidate in order until one logs in / 依次尝试候选地址
    async fn connect(&self) -> Result<Box<dyn SmbConnection>, SmbError> {
        let candidates = resolver::candidates(&self.settings.host)?;
        let mut failures = Vec::new();
        for candidate in &candidates {
            match self.connect_candidate(candidate).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::debug!("SMB: candidate {:?} failed: {}", candidate, e);
                    failures.push(e.to_string());
                }
            }
        }
        Err(SmbError::ConnectionSetup(failures.join("; ")))
    }

    async fn connect_candidate(&self, candidate: &Candidate) -> Result<Box<dyn SmbConnection>, SmbError> {
        let endpoint = self.resolver.resolve(candidate).await?;
        let params = ConnectParams {
            username: self.settings.username.clone(),
            password: self.settings.password.clone(),
            domain: self.settings.domain.clone(),
            client_name: self.settings.client_name.clone(),
            server_name: endpoint.server_name.clone(),
            address: endpoint.address,
            port: self.settings.port(),
            direct_tcp: self.settings.direct_tcp,
            timeout: self.settings.timeout,
        };
        tracing::debug!(
            "SMB: connecting to {}:{} as {} (remote name {})",
            params.address,
            params.port,
            params.username,
            params.server_name
        );
        match tokio::time::timeout(self.settings.timeout, self.connector.connect(&params)).await {
            Ok(result) => result,
            Err(_) => Err(SmbError::ConnectionSetup(format!(
                "connect to {}:{} timed out",
                params.address, params.port
            ))),
        }
    }

    // Typed requests / 具体请求

    pub async fn capabilities(&self) -> Result<Capabilities, SmbError> {
        self.ensure().await
    }

    pub async fn list_shares(&self) -> Result<Vec<ShareInfo>, SmbError> {
        self.call(|conn| conn.list_shares()).await
    }

    pub async fn list_path(&self, share: &str, path: &str) -> Result<Vec<SharedFile>, SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.list_path(&share, &path).await })
        })
        .await
    }

    pub async fn get_attributes(&self, share: &str, path: &str) -> Result<SharedFile, SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.get_attributes(&share, &path).await })
        })
        .await
    }

    pub async fn get_security(&self, share: &str, path: &str) -> Result<SecurityDescriptor, SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.get_security(&share, &path).await })
        })
        .await
    }

    pub async fn create_directory(&self, share: &str, path: &str) -> Result<(), SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.create_directory(&share, &path).await })
        })
        .await
    }

    pub async fn delete_directory(&self, share: &str, path: &str) -> Result<(), SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.delete_directory(&share, &path).await })
        })
        .await
    }

    pub async fn delete_file(&self, share: &str, path: &str) -> Result<(), SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.delete_file(&share, &path).await })
        })
        .await
    }

    pub async fn rename(&self, share: &str, old_path: &str, new_path: &str) -> Result<(), SmbError> {
        let (share, old_path, new_path) = (share.to_string(), old_path.to_string(), new_path.to_string());
        self.call(move |conn| {
            let (share, old_path, new_path) = (share.clone(), old_path.clone(), new_path.clone());
            Box::pin(async move { conn.rename(&share, &old_path, &new_path).await })
        })
        .await
    }

    /// Open a file, returns the generation the identifier belongs to / 打开文件
    pub async fn open(
        &self,
        share: &str,
        path: &str,
        disposition: Disposition,
        access: Access,
    ) -> Result<(OpenedFile, u64), SmbError> {
        let (share, path) = (share.to_string(), path.to_string());
        self.call_tracked(move |conn| {
            let (share, path) = (share.clone(), path.clone());
            Box::pin(async move { conn.open(&share, &path, disposition, access).await })
        })
        .await
    }

    pub async fn read(&self, generation: u64, fid: FileId, offset: u64, len: usize) -> Result<Bytes, SmbError> {
        self.call_pinned(generation, move |conn| conn.read(fid, offset, len)).await
    }

    pub async fn write(&self, generation: u64, fid: FileId, offset: u64, data: Bytes) -> Result<usize, SmbError> {
        self.call_pinned(generation, move |conn| {
            Box::pin(async move { conn.write(fid, offset, &data).await })
        })
        .await
    }

    pub async fn query_size(&self, generation: u64, fid: FileId) -> Result<u64, SmbError> {
        self.call_pinned(generation, move |conn| conn.query_size(fid)).await
    }

    pub async fn close_file(&self, generation: u64, fid: FileId) -> Result<(), SmbError> {
        self.call_pinned(generation, move |conn| conn.close_file(fid)).await
    }
}

//! In-process SMB server / 内存 SMB 服务器
//!
//! Implements the connector interface on top of an in-memory tree of
//! shares. It behaves like a small Samba instance: named shares, accounts,
//! guest access, dialect-dependent capabilities and NT status codes. Fault
//! injection hooks let callers drop live connections, refuse logins or
//! slow every request down.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::client::{
    access_mask, attributes, Access, Ace, AceType, Capabilities, ConnectParams, Dialect,
    Disposition, FileId, NtStatus, OpenedFile, SecurityDescriptor, ShareInfo, ShareKind,
    SharedFile, Sid, SmbConnection, SmbConnector, SmbError,
};
use super::info::now_filetime;
use super::resolver::{NameResolver, WILDCARD_SERVER_NAME};
use super::session::{DIRECT_TCP_PORT, NETBIOS_PORT};
use crate::utils;

const GUEST_ACCOUNT: &str = "guest";
const DOMAIN_SID: &str = "S-1-5-21-3623811015-3361044348-30300820";
/// Largest file the server stores / 最大文件大小
const MAX_FILE_SIZE: usize = 1 << 30;

/// A login attempt that reached the server / 连接记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub address: IpAddr,
    pub port: u16,
    pub server_name: String,
    pub username: String,
}

#[derive(Debug, Clone)]
enum NodeKind {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    created: u64,
    modified: u64,
    accessed: u64,
    /// Attribute bits besides DIRECTORY/ARCHIVE / 额外属性
    extra_attributes: u32,
    owner: Sid,
}

impl Node {
    fn dir(owner: Sid) -> Self {
        Self::new(NodeKind::Dir(BTreeMap::new()), owner)
    }

    fn file(data: Vec<u8>, owner: Sid) -> Self {
        Self::new(NodeKind::File(data), owner)
    }

    fn new(kind: NodeKind, owner: Sid) -> Self {
        let now = now_filetime();
        Self {
            kind,
            created: now,
            modified: now,
            accessed: now,
            extra_attributes: 0,
            owner,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir(_))
    }

    fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Dir(_) => 0,
        }
    }

    fn record(&self, name: &str, extended: bool) -> SharedFile {
        let base = if self.is_dir() {
            attributes::DIRECTORY
        } else {
            attributes::ARCHIVE
        };
        SharedFile {
            filename: name.to_string(),
            is_directory: self.is_dir(),
            file_size: self.size(),
            create_time: self.created,
            last_write_time: self.modified,
            last_access_time: self.accessed,
            file_attributes: extended.then_some(base | self.extra_attributes),
        }
    }
}

struct MemoryShare {
    kind: ShareKind,
    comments: String,
    guest_writable: bool,
    root: Node,
}

struct OpenFile {
    share: String,
    path: String,
    access: Access,
    epoch: u64,
    connection: u64,
}

struct ServerState {
    name: String,
    addresses: Vec<IpAddr>,
    ports: Vec<u16>,
    dialect: Dialect,
    /// username -> (password, sid)
    accounts: HashMap<String, (String, Sid)>,
    shares: BTreeMap<String, MemoryShare>,
    /// Bumped to sever every live connection / 断开所有连接
    epoch: u64,
    refuse_connects: usize,
    latency: Option<Duration>,
    /// Extra bytes claimed by read and write replies / 应答多报字节数
    overrun: usize,
    connect_count: usize,
    request_count: usize,
    connect_log: Vec<ConnectAttempt>,
    next_connection: u64,
    next_fid: u64,
    open_files: HashMap<u64, OpenFile>,
}

/// In-memory server, cheap to clone / 内存服务器
#[derive(Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

fn status(code: NtStatus, message: impl Into<String>) -> SmbError {
    SmbError::status(code, message)
}

impl MemoryServer {
    /// Server known as `name`, listening on `addresses` (ports 139 and 445) / 创建服务器
    pub fn new(name: &str, addresses: &[IpAddr]) -> Self {
        let mut shares = BTreeMap::new();
        shares.insert(
            "IPC$".to_string(),
            MemoryShare {
                kind: ShareKind::Ipc,
                comments: "IPC Service".to_string(),
                guest_writable: false,
                root: Node::dir(Self::sid_for(0)),
            },
        );
        let state = ServerState {
            name: name.to_string(),
            addresses: addresses.to_vec(),
            ports: vec![NETBIOS_PORT, DIRECT_TCP_PORT],
            dialect: Dialect::Smb2,
            accounts: HashMap::new(),
            shares,
            epoch: 0,
            refuse_connects: 0,
            overrun: 0,
            latency: None,
            connect_count: 0,
            request_count: 0,
            connect_log: Vec::new(),
            next_connection: 0,
            next_fid: 0,
            open_files: HashMap::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn sid_for(rid: u32) -> Sid {
        Sid(format!("{}-{}", DOMAIN_SID, rid))
    }

    pub fn with_account(self, username: &str, password: &str) -> Self {
        {
            let mut state = self.state.lock();
            let rid = 1000 + state.accounts.len() as u32;
            state
                .accounts
                .insert(username.to_string(), (password.to_string(), Self::sid_for(rid)));
        }
        self
    }

    /// Add a disk share; guests may write to it only when `guest_writable` / 添加磁盘共享
    pub fn with_share(self, name: &str, guest_writable: bool) -> Self {
        self.state.lock().shares.insert(
            name.to_string(),
            MemoryShare {
                kind: ShareKind::Disk,
                comments: String::new(),
                guest_writable,
                root: Node::dir(Self::sid_for(0)),
            },
        );
        self
    }

    pub fn with_printer(self, name: &str) -> Self {
        self.state.lock().shares.insert(
            name.to_string(),
            MemoryShare {
                kind: ShareKind::PrintQueue,
                comments: "printer".to_string(),
                guest_writable: false,
                root: Node::dir(Self::sid_for(0)),
            },
        );
        self
    }

    pub fn with_dialect(self, dialect: Dialect) -> Self {
        self.state.lock().dialect = dialect;
        self
    }

    /// Ports the server listens on / 监听端口
    pub fn with_ports(self, ports: &[u16]) -> Self {
        self.state.lock().ports = ports.to_vec();
        self
    }

    /// Resolver that knows this server's name / 名称解析器
    pub fn name_resolver(&self) -> MemoryNameResolver {
        let state = self.state.lock();
        let mut resolver = MemoryNameResolver::new();
        for address in &state.addresses {
            resolver = resolver.with_host(&state.name, *address);
        }
        resolver
    }

    pub fn sid_of(&self, username: &str) -> Option<Sid> {
        self.state.lock().accounts.get(username).map(|(_, sid)| sid.clone())
    }

    // Fault injection / 故障注入

    /// Sever every live connection / 断开所有连接
    pub fn drop_connections(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.open_files.clear();
    }

    pub fn refuse_next_connects(&self, count: usize) {
        self.state.lock().refuse_connects = count;
    }

    /// Delay applied to every request / 请求延迟
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Make replies overshoot: reads return up to `extra` bytes past the
    /// requested length and writes acknowledge `extra` bytes more than sent / 应答越界
    pub fn set_reply_overrun(&self, extra: usize) {
        self.state.lock().overrun = extra;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().request_count
    }

    pub fn connect_log(&self) -> Vec<ConnectAttempt> {
        self.state.lock().connect_log.clone()
    }

    pub fn open_file_count(&self) -> usize {
        self.state.lock().open_files.len()
    }

    // Direct tree access / 直接访问目录树

    /// Create or replace a file, creating missing directories / 写入文件
    pub fn put_file(&self, share: &str, path: &str, data: &[u8]) {
        let mut state = self.state.lock();
        let Some(share) = state.shares.get_mut(share) else {
            return;
        };
        let owner = share.root.owner.clone();
        let segments = utils::segments(path);
        let Some((name, parents)) = segments.split_last() else {
            return;
        };
        let mut node = &mut share.root;
        for segment in parents {
            let NodeKind::Dir(children) = &mut node.kind else {
                return;
            };
            node = children
                .entry(segment.clone())
                .or_insert_with(|| Node::dir(owner.clone()));
        }
        if let NodeKind::Dir(children) = &mut node.kind {
            children.insert(name.clone(), Node::file(data.to_vec(), owner));
        }
    }

    /// Create a directory and its ancestors / 创建目录
    pub fn make_dir(&self, share: &str, path: &str) {
        let mut state = self.state.lock();
        let Some(share) = state.shares.get_mut(share) else {
            return;
        };
        let owner = share.root.owner.clone();
        let mut node = &mut share.root;
        for segment in utils::segments(path) {
            let NodeKind::Dir(children) = &mut node.kind else {
                return;
            };
            node = children.entry(segment).or_insert_with(|| Node::dir(owner.clone()));
        }
    }

    pub fn read_file(&self, share: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let share = state.shares.get(share)?;
        match &lookup(&share.root, path)?.kind {
            NodeKind::File(data) => Some(data.clone()),
            NodeKind::Dir(_) => None,
        }
    }

    pub fn exists(&self, share: &str, path: &str) -> bool {
        let state = self.state.lock();
        state
            .shares
            .get(share)
            .map(|s| lookup(&s.root, path).is_some())
            .unwrap_or(false)
    }

    /// OR extra FILE_ATTRIBUTE_* bits into an entry / 设置属性位
    pub fn set_attributes(&self, share: &str, path: &str, bits: u32) {
        let mut state = self.state.lock();
        if let Some(share) = state.shares.get_mut(share) {
            if let Some(node) = lookup_mut(&mut share.root, path) {
                node.extra_attributes |= bits;
            }
        }
    }
}

fn lookup<'n>(root: &'n Node, path: &str) -> Option<&'n Node> {
    let mut node = root;
    for segment in utils::segments(path) {
        match &node.kind {
            NodeKind::Dir(children) => node = children.get(&segment)?,
            NodeKind::File(_) => return None,
        }
    }
    Some(node)
}

fn lookup_mut<'n>(root: &'n mut Node, path: &str) -> Option<&'n mut Node> {
    let mut node = root;
    for segment in utils::segments(path) {
        match &mut node.kind {
            NodeKind::Dir(children) => node = children.get_mut(&segment)?,
            NodeKind::File(_) => return None,
        }
    }
    Some(node)
}

/// Missing entry: distinguish a missing leaf from a missing ancestor / 区分缺失的路径层级
fn missing(root: &Node, path: &str) -> SmbError {
    let (parent, _) = utils::split(path);
    match lookup(root, &parent) {
        Some(node) if node.is_dir() => status(NtStatus::OBJECT_NAME_NOT_FOUND, path),
        _ => status(NtStatus::OBJECT_PATH_NOT_FOUND, path),
    }
}

/// Children map of the parent directory of `path` / 父目录
fn parent_dir<'n>(root: &'n mut Node, path: &str) -> Result<&'n mut BTreeMap<String, Node>, SmbError> {
    let (parent, _) = utils::split(path);
    match lookup_mut(root, &parent) {
        Some(Node {
            kind: NodeKind::Dir(children),
            ..
        }) => Ok(children),
        _ => Err(status(NtStatus::OBJECT_PATH_NOT_FOUND, path)),
    }
}

#[async_trait]
impl SmbConnector for MemoryServer {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn SmbConnection>, SmbError> {
        let mut state = self.state.lock();
        state.connect_log.push(ConnectAttempt {
            address: params.address,
            port: params.port,
            server_name: params.server_name.clone(),
            username: params.username.clone(),
        });

        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(SmbError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        if !state.addresses.contains(&params.address) || !state.ports.contains(&params.port) {
            return Err(SmbError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("nothing listening on {}:{}", params.address, params.port),
            )));
        }
        if !params.direct_tcp
            && !params.server_name.eq_ignore_ascii_case(&state.name)
            && params.server_name != WILDCARD_SERVER_NAME
        {
            return Err(SmbError::Protocol(format!(
                "called name {} not present",
                params.server_name
            )));
        }

        let user = if params.username.eq_ignore_ascii_case(GUEST_ACCOUNT) {
            None
        } else {
            match state.accounts.get(&params.username) {
                Some((password, sid)) if *password == params.password => Some(sid.clone()),
                _ => return Err(status(NtStatus::LOGON_FAILURE, "bad username or password")),
            }
        };

        state.connect_count += 1;
        state.next_connection += 1;
        let connection = MemoryConnection {
            server: self.clone(),
            id: state.next_connection,
            epoch: state.epoch,
            peer: SocketAddr::new(params.address, params.port),
            user,
            capabilities: Capabilities::for_dialect(state.dialect),
            logged_off: false,
        };
        Ok(Box::new(connection))
    }
}

/// One logged-in connection to a [`MemoryServer`] / 内存连接
pub struct MemoryConnection {
    server: MemoryServer,
    id: u64,
    epoch: u64,
    peer: SocketAddr,
    /// `None` for guest logins / 来宾为 None
    user: Option<Sid>,
    capabilities: Capabilities,
    logged_off: bool,
}

impl MemoryConnection {
    /// Every request passes through here: latency, liveness and accounting / 请求入口
    async fn begin(&self) -> Result<(), SmbError> {
        let latency = self.server.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.server.state.lock();
        if self.logged_off || state.epoch != self.epoch {
            return Err(SmbError::Disconnected("connection reset by peer".to_string()));
        }
        state.request_count += 1;
        Ok(())
    }

    fn owner(&self) -> Sid {
        self.user.clone().unwrap_or_else(|| MemoryServer::sid_for(501))
    }

    fn check_write(&self, share: &MemoryShare, path: &str) -> Result<(), SmbError> {
        if self.user.is_none() && !share.guest_writable {
            return Err(status(NtStatus::ACCESS_DENIED, path));
        }
        Ok(())
    }

    fn with_share<T>(
        &self,
        share: &str,
        f: impl FnOnce(&mut MemoryShare) -> Result<T, SmbError>,
    ) -> Result<T, SmbError> {
        let mut state = self.server.state.lock();
        let share = state
            .shares
            .get_mut(share)
            .ok_or_else(|| status(NtStatus::BAD_NETWORK_NAME, share))?;
        f(share)
    }
}

#[async_trait]
impl SmbConnection for MemoryConnection {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }

    async fn echo(&mut self) -> Result<(), SmbError> {
        self.begin().await
    }

    async fn list_shares(&mut self) -> Result<Vec<ShareInfo>, SmbError> {
        self.begin().await?;
        let state = self.server.state.lock();
        Ok(state
            .shares
            .iter()
            .map(|(name, share)| ShareInfo {
                name: name.clone(),
                kind: share.kind,
                comments: share.comments.clone(),
                is_special: name.ends_with('$'),
            })
            .collect())
    }

    async fn list_path(&mut self, share: &str, path: &str) -> Result<Vec<SharedFile>, SmbError> {
        self.begin().await?;
        let extended = self.capabilities.extended_attributes;
        self.with_share(share, |share| {
            let node = lookup(&share.root, path).ok_or_else(|| missing(&share.root, path))?;
            let NodeKind::Dir(children) = &node.kind else {
                return Err(status(NtStatus::NOT_A_DIRECTORY, path));
            };
            let mut entries = vec![node.record(".", extended), node.record("..", extended)];
            entries.extend(children.iter().map(|(name, child)| child.record(name, extended)));
            Ok(entries)
        })
    }

    async fn get_attributes(&mut self, share: &str, path: &str) -> Result<SharedFile, SmbError> {
        self.begin().await?;
        let extended = self.capabilities.extended_attributes;
        self.with_share(share, |share| {
            let node = lookup(&share.root, path).ok_or_else(|| missing(&share.root, path))?;
            Ok(node.record(&utils::basename(path), extended))
        })
    }

    async fn get_security(&mut self, share: &str, path: &str) -> Result<SecurityDescriptor, SmbError> {
        self.begin().await?;
        if !self.capabilities.security_descriptors {
            return Err(SmbError::NotReady("security descriptors require SMB2".to_string()));
        }
        self.with_share(share, |share| {
            let node = lookup(&share.root, path).ok_or_else(|| missing(&share.root, path))?;
            let mut everyone = access_mask::GENERIC_READ | access_mask::GENERIC_EXECUTE;
            if share.guest_writable {
                everyone |= access_mask::GENERIC_WRITE;
            }
            Ok(SecurityDescriptor {
                owner: Some(node.owner.clone()),
                group: Some(MemoryServer::sid_for(513)),
                dacl: vec![
                    Ace {
                        ace_type: AceType::AccessAllowed,
                        sid: node.owner.clone(),
                        mask: access_mask::FILE_ALL_ACCESS,
                    },
                    Ace {
                        ace_type: AceType::AccessAllowed,
                        sid: Sid::everyone(),
                        mask: everyone,
                    },
                ],
            })
        })
    }

    async fn create_directory(&mut self, share: &str, path: &str) -> Result<(), SmbError> {
        self.begin().await?;
        let owner = self.owner();
        self.with_share(share, |share| {
            self.check_write(share, path)?;
            let name = utils::basename(path);
            if name.is_empty() {
                return Err(status(NtStatus::OBJECT_NAME_COLLISION, path));
            }
            let children = parent_dir(&mut share.root, path)?;
            if children.contains_key(&name) {
                return Err(status(NtStatus::OBJECT_NAME_COLLISION, path));
            }
            children.insert(name, Node::dir(owner));
            Ok(())
        })
    }

    async fn delete_directory(&mut self, share: &str, path: &str) -> Result<(), SmbError> {
        self.begin().await?;
        self.with_share(share, |share| {
            self.check_write(share, path)?;
            let name = utils::basename(path);
            if name.is_empty() {
                return Err(status(NtStatus::ACCESS_DENIED, path));
            }
            let node = lookup(&share.root, path).ok_or_else(|| missing(&share.root, path))?;
            match &node.kind {
                NodeKind::File(_) => return Err(status(NtStatus::NOT_A_DIRECTORY, path)),
                NodeKind::Dir(children) if !children.is_empty() => {
                    return Err(status(NtStatus::DIRECTORY_NOT_EMPTY, path))
                }
                NodeKind::Dir(_) => {}
            }
            parent_dir(&mut share.root, path)?.remove(&name);
            Ok(())
        })
    }

    async fn delete_file(&mut self, share: &str, path: &str) -> Result<(), SmbError> {
        self.begin().await?;
        self.with_share(share, |share| {
            self.check_write(share, path)?;
            let node = lookup(&share.root, path).ok_or_else(|| missing(&share.root, path))?;
            if node.is_dir() {
                return Err(status(NtStatus::FILE_IS_A_DIRECTORY, path));
            }
            parent_dir(&mut share.root, path)?.remove(&utils::basename(path));
            Ok(())
        })
    }

    async fn rename(&mut self, share: &str, old_path: &str, new_path: &str) -> Result<(), SmbError> {
        self.begin().await?;
        self.with_share(share, |share| {
            self.check_write(share, old_path)?;
            if lookup(&share.root, old_path).is_none() {
                return Err(missing(&share.root, old_path));
            }
            let new_name = utils::basename(new_path);
            {
                let target = parent_dir(&mut share.root, new_path)?;
                if target.contains_key(&new_name) {
                    return Err(status(NtStatus::OBJECT_NAME_COLLISION, new_path));
                }
            }
            let node = parent_dir(&mut share.root, old_path)?
                .remove(&utils::basename(old_path))
                .ok_or_else(|| status(NtStatus::OBJECT_NAME_NOT_FOUND, old_path))?;
            parent_dir(&mut share.root, new_path)?.insert(new_name, node);
            Ok(())
        })
    }

    async fn open(
        &mut self,
        share: &str,
        path: &str,
        disposition: Disposition,
        access: Access,
    ) -> Result<OpenedFile, SmbError> {
        self.begin().await?;
        let owner = self.owner();
        let size = self.with_share(share, |share| {
            if access.write {
                self.check_write(share, path)?;
            }
            let name = utils::basename(path);
            if name.is_empty() {
                return Err(status(NtStatus::FILE_IS_A_DIRECTORY, path));
            }
            let children = parent_dir(&mut share.root, path)?;
            match (children.get_mut(&name), disposition) {
                (Some(node), _) if node.is_dir() => Err(status(NtStatus::FILE_IS_A_DIRECTORY, path)),
                (Some(_), Disposition::Create) => Err(status(NtStatus::OBJECT_NAME_COLLISION, path)),
                (Some(node), Disposition::OverwriteIf) => {
                    node.kind = NodeKind::File(Vec::new());
                    node.modified = now_filetime();
                    Ok(0)
                }
                (Some(node), _) => Ok(node.size()),
                (None, Disposition::Open) => Err(status(NtStatus::OBJECT_NAME_NOT_FOUND, path)),
                (None, _) => {
                    children.insert(name, Node::file(Vec::new(), owner));
                    Ok(0)
                }
            }
        })?;

        let mut state = self.server.state.lock();
        state.next_fid += 1;
        let fid = state.next_fid;
        let epoch = state.epoch;
        state.open_files.insert(
            fid,
            OpenFile {
                share: share.to_string(),
                path: utils::fix_and_clean_path(path),
                access,
                epoch,
                connection: self.id,
            },
        );
        Ok(OpenedFile {
            fid: FileId(fid),
            size,
        })
    }

    async fn read(&mut self, fid: FileId, offset: u64, len: usize) -> Result<Bytes, SmbError> {
        self.begin().await?;
        let state = self.server.state.lock();
        let len = len.min(self.capabilities.max_read_size) + state.overrun;
        let file = state
            .open_files
            .get(&fid.0)
            .filter(|f| f.epoch == self.epoch)
            .ok_or_else(|| status(NtStatus::INVALID_HANDLE, fid.to_string()))?;
        if !file.access.read {
            return Err(status(NtStatus::ACCESS_DENIED, file.path.clone()));
        }
        let node = state
            .shares
            .get(&file.share)
            .and_then(|s| lookup(&s.root, &file.path))
            .ok_or_else(|| status(NtStatus::INVALID_HANDLE, file.path.clone()))?;
        let NodeKind::File(data) = &node.kind else {
            return Err(status(NtStatus::FILE_IS_A_DIRECTORY, file.path.clone()));
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    async fn write(&mut self, fid: FileId, offset: u64, data: &[u8]) -> Result<usize, SmbError> {
        self.begin().await?;
        let data = &data[..data.len().min(self.capabilities.max_write_size)];
        let mut state = self.server.state.lock();
        let overrun = state.overrun;
        let (share, path) = {
            let file = state
                .open_files
                .get(&fid.0)
                .filter(|f| f.epoch == self.epoch)
                .ok_or_else(|| status(NtStatus::INVALID_HANDLE, fid.to_string()))?;
            if !file.access.write {
                return Err(status(NtStatus::ACCESS_DENIED, file.path.clone()));
            }
            (file.share.clone(), file.path.clone())
        };
        let node = state
            .shares
            .get_mut(&share)
            .and_then(|s| lookup_mut(&mut s.root, &path))
            .ok_or_else(|| status(NtStatus::INVALID_HANDLE, path.clone()))?;
        let NodeKind::File(content) = &mut node.kind else {
            return Err(status(NtStatus::FILE_IS_A_DIRECTORY, path));
        };
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some((start, start.checked_add(data.len())?)))
            .filter(|(_, end)| *end <= MAX_FILE_SIZE);
        let Some((start, end)) = range else {
            return Err(status(NtStatus::DISK_FULL, path));
        };
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        node.modified = now_filetime();
        Ok(data.len() + overrun)
    }

    async fn query_size(&mut self, fid: FileId) -> Result<u64, SmbError> {
        self.begin().await?;
        let state = self.server.state.lock();
        let file = state
            .open_files
            .get(&fid.0)
            .filter(|f| f.epoch == self.epoch)
            .ok_or_else(|| status(NtStatus::INVALID_HANDLE, fid.to_string()))?;
        state
            .shares
            .get(&file.share)
            .and_then(|s| lookup(&s.root, &file.path))
            .map(Node::size)
            .ok_or_else(|| status(NtStatus::INVALID_HANDLE, file.path.clone()))
    }

    async fn close_file(&mut self, fid: FileId) -> Result<(), SmbError> {
        self.begin().await?;
        let mut state = self.server.state.lock();
        match state.open_files.remove(&fid.0) {
            Some(_) => Ok(()),
            None => Err(status(NtStatus::INVALID_HANDLE, fid.to_string())),
        }
    }

    async fn logoff(&mut self) -> Result<(), SmbError> {
        self.begin().await?;
        self.logged_off = true;
        let mut state = self.server.state.lock();
        let id = self.id;
        state.open_files.retain(|_, f| f.connection != id);
        Ok(())
    }
}

/// Name table with query counters / 内存名称解析
#[derive(Debug, Default)]
pub struct MemoryNameResolver {
    hosts: Vec<(String, IpAddr)>,
    address_queries: AtomicUsize,
    name_queries: AtomicUsize,
}

impl MemoryNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: &str, address: IpAddr) -> Self {
        self.hosts.push((name.to_string(), address));
        self
    }

    /// Name -> address queries seen / 正向查询次数
    pub fn address_queries(&self) -> usize {
        self.address_queries.load(Ordering::SeqCst)
    }

    /// Address -> name queries seen / 反向查询次数
    pub fn name_queries(&self) -> usize {
        self.name_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for MemoryNameResolver {
    async fn query_address_for_name(&self, name: &str, _timeout: Duration) -> Option<IpAddr> {
        self.address_queries.fetch_add(1, Ordering::SeqCst);
        self.hosts
            .iter()
            .find(|(host, _)| host.eq_ignore_ascii_case(name))
            .map(|(_, address)| *address)
    }

    async fn query_name_for_address(&self, address: IpAddr, _timeout: Duration) -> Option<String> {
        self.name_queries.fetch_add(1, Ordering::SeqCst);
        self.hosts
            .iter()
            .find(|(_, a)| *a == address)
            .map(|(name, _)| name.clone())
    }
}

//! SMB protocol client interface / SMB 协议客户端接口
//!
//! The wire protocol (framing, NTLM handshake, SMB1/SMB2 negotiation) is
//! supplied by a protocol-client library. This module is the boundary the
//! adapter talks to: connection primitives and the native vocabulary of
//! records and errors they return.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// NT status code / NT 状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    pub const INVALID_HANDLE: NtStatus = NtStatus(0xC000_0008);
    pub const NO_SUCH_FILE: NtStatus = NtStatus(0xC000_000F);
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022);
    pub const OBJECT_NAME_INVALID: NtStatus = NtStatus(0xC000_0033);
    pub const OBJECT_NAME_NOT_FOUND: NtStatus = NtStatus(0xC000_0034);
    pub const OBJECT_NAME_COLLISION: NtStatus = NtStatus(0xC000_0035);
    pub const OBJECT_PATH_NOT_FOUND: NtStatus = NtStatus(0xC000_003A);
    pub const SHARING_VIOLATION: NtStatus = NtStatus(0xC000_0043);
    pub const LOGON_FAILURE: NtStatus = NtStatus(0xC000_006D);
    pub const DISK_FULL: NtStatus = NtStatus(0xC000_007F);
    pub const FILE_IS_A_DIRECTORY: NtStatus = NtStatus(0xC000_00BA);
    pub const BAD_NETWORK_NAME: NtStatus = NtStatus(0xC000_00CC);
    pub const DIRECTORY_NOT_EMPTY: NtStatus = NtStatus(0xC000_0101);
    pub const NOT_A_DIRECTORY: NtStatus = NtStatus(0xC000_0103);
    pub const CANNOT_DELETE: NtStatus = NtStatus(0xC000_0121);
    pub const NETWORK_ACCESS_DENIED: NtStatus = NtStatus(0xC000_00CA);

    fn name(&self) -> Option<&'static str> {
        let name = match *self {
            NtStatus::SUCCESS => "STATUS_SUCCESS",
            NtStatus::INVALID_HANDLE => "STATUS_INVALID_HANDLE",
            NtStatus::NO_SUCH_FILE => "STATUS_NO_SUCH_FILE",
            NtStatus::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            NtStatus::OBJECT_NAME_INVALID => "STATUS_OBJECT_NAME_INVALID",
            NtStatus::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            NtStatus::OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
            NtStatus::OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            NtStatus::SHARING_VIOLATION => "STATUS_SHARING_VIOLATION",
            NtStatus::LOGON_FAILURE => "STATUS_LOGON_FAILURE",
            NtStatus::DISK_FULL => "STATUS_DISK_FULL",
            NtStatus::FILE_IS_A_DIRECTORY => "STATUS_FILE_IS_A_DIRECTORY",
            NtStatus::BAD_NETWORK_NAME => "STATUS_BAD_NETWORK_NAME",
            NtStatus::DIRECTORY_NOT_EMPTY => "STATUS_DIRECTORY_NOT_EMPTY",
            NtStatus::NOT_A_DIRECTORY => "STATUS_NOT_A_DIRECTORY",
            NtStatus::CANNOT_DELETE => "STATUS_CANNOT_DELETE",
            NtStatus::NETWORK_ACCESS_DENIED => "STATUS_NETWORK_ACCESS_DENIED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

/// Native protocol / transport error / 协议层错误
#[derive(Debug, Error)]
pub enum SmbError {
    /// The server answered with a failure status / 服务器返回错误状态
    #[error("{status}: {message}")]
    OperationFailure { status: NtStatus, message: String },

    /// The negotiated dialect cannot service this request / 当前协议版本不支持
    #[error("not supported by the negotiated dialect: {0}")]
    NotReady(String),

    /// The socket is gone (broken pipe, reset, EOF) / 连接已断开
    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out")]
    Timeout,

    /// Malformed or unexpected response / 协议错误
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Name resolution, connect or login failed / 连接建立失败
    #[error("connection setup failed: {0}")]
    ConnectionSetup(String),

    /// File identifier belongs to an earlier session / 句柄已失效
    #[error("file handle belongs to a closed session")]
    StaleHandle,
}

impl SmbError {
    pub fn status(status: NtStatus, message: impl Into<String>) -> Self {
        SmbError::OperationFailure {
            status,
            message: message.into(),
        }
    }

    /// NT status, when the server produced one / NT 状态码
    pub fn nt_status(&self) -> Option<NtStatus> {
        match self {
            SmbError::OperationFailure { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The session can no longer be used and must be recreated / 会话已失效
    pub fn is_dead_session(&self) -> bool {
        matches!(self, SmbError::Disconnected(_) | SmbError::Io(_))
    }
}

/// Negotiated protocol dialect / 协商的协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Smb1,
    Smb2,
}

/// What the connected dialect can do / 连接能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub dialect: Dialect,
    /// Security descriptor queries (owner / DACL) / 安全描述符查询
    pub security_descriptors: bool,
    /// Extended FILE_ATTRIBUTE_* flags in directory records / 扩展属性
    pub extended_attributes: bool,
    pub max_read_size: usize,
    pub max_write_size: usize,
}

impl Capabilities {
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Smb1 => Self {
                dialect,
                security_descriptors: false,
                extended_attributes: false,
                max_read_size: 60 * 1024,
                max_write_size: 60 * 1024,
            },
            Dialect::Smb2 => Self {
                dialect,
                security_descriptors: true,
                extended_attributes: true,
                max_read_size: 1024 * 1024,
                max_write_size: 1024 * 1024,
            },
        }
    }
}

/// FILE_ATTRIBUTE_* bits / 文件属性位
pub mod attributes {
    pub const READONLY: u32 = 0x0001;
    pub const HIDDEN: u32 = 0x0002;
    pub const SYSTEM: u32 = 0x0004;
    pub const DIRECTORY: u32 = 0x0010;
    pub const ARCHIVE: u32 = 0x0020;
    pub const NORMAL: u32 = 0x0080;
}

/// Directory entry / attribute record as returned by the server / 目录项
#[derive(Debug, Clone, PartialEq)]
pub struct SharedFile {
    pub filename: String,
    pub is_directory: bool,
    pub file_size: u64,
    /// FILETIME ticks (100ns since 1601-01-01), 0 when unknown / FILETIME
    pub create_time: u64,
    pub last_write_time: u64,
    pub last_access_time: u64,
    /// `None` when the dialect did not report extended attributes / 扩展属性
    pub file_attributes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareKind {
    Disk,
    PrintQueue,
    CommDevice,
    Ipc,
}

/// Share as returned by share enumeration / 共享信息
#[derive(Debug, Clone, PartialEq)]
pub struct ShareInfo {
    pub name: String,
    pub kind: ShareKind,
    pub comments: String,
    pub is_special: bool,
}

/// Well-known and account security identifiers / 安全标识符
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sid(pub String);

impl Sid {
    pub const EVERYONE: &'static str = "S-1-1-0";

    pub fn everyone() -> Self {
        Sid(Self::EVERYONE.to_string())
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access mask bits used for permission translation / 访问掩码
pub mod access_mask {
    pub const FILE_READ_DATA: u32 = 0x0000_0001;
    pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
    pub const FILE_APPEND_DATA: u32 = 0x0000_0004;
    pub const FILE_EXECUTE: u32 = 0x0000_0020;
    pub const GENERIC_ALL: u32 = 0x1000_0000;
    pub const GENERIC_EXECUTE: u32 = 0x2000_0000;
    pub const GENERIC_WRITE: u32 = 0x4000_0000;
    pub const GENERIC_READ: u32 = 0x8000_0000;
    pub const FILE_ALL_ACCESS: u32 = 0x001F_01FF;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceType {
    AccessAllowed,
    AccessDenied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: AceType,
    pub sid: Sid,
    pub mask: u32,
}

/// Security descriptor / 安全描述符
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub dacl: Vec<Ace>,
}

/// CREATE disposition / 创建方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Open existing, fail if missing / 打开已存在
    Open,
    /// Create new, fail if present / 新建
    Create,
    /// Open existing or create / 打开或创建
    OpenIf,
    /// Truncate existing or create / 覆盖或创建
    OverwriteIf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
}

/// Server-side file identifier / 服务器文件标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fid:{:#x}", self.0)
    }
}

/// Result of a successful open / 打开结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedFile {
    pub fid: FileId,
    pub size: u64,
}

/// Login parameters / 登录参数
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub username: String,
    pub password: String,
    pub domain: String,
    /// Local NetBIOS name / 本地 NetBIOS 名称
    pub client_name: String,
    /// Remote NetBIOS name used for session setup / 远端 NetBIOS 名称
    pub server_name: String,
    pub address: IpAddr,
    pub port: u16,
    pub direct_tcp: bool,
    pub timeout: Duration,
}

/// One authenticated connection / 一个已认证的连接
///
/// Requests are strictly sequential: callers must not issue a request
/// before the previous one returned. Paths are in-share and `/`-separated.
#[async_trait]
pub trait SmbConnection: Send {
    fn capabilities(&self) -> Capabilities;

    /// Remote socket address / 远端地址
    fn peer(&self) -> SocketAddr;

    /// Liveness check / 心跳
    async fn echo(&mut self) -> Result<(), SmbError>;

    async fn list_shares(&mut self) -> Result<Vec<ShareInfo>, SmbError>;

    async fn list_path(&mut self, share: &str, path: &str) -> Result<Vec<SharedFile>, SmbError>;

    async fn get_attributes(&mut self, share: &str, path: &str) -> Result<SharedFile, SmbError>;

    async fn get_security(&mut self, share: &str, path: &str) -> Result<SecurityDescriptor, SmbError>;

    async fn create_directory(&mut self, share: &str, path: &str) -> Result<(), SmbError>;

    async fn delete_directory(&mut self, share: &str, path: &str) -> Result<(), SmbError>;

    async fn delete_file(&mut self, share: &str, path: &str) -> Result<(), SmbError>;

    async fn rename(&mut self, share: &str, old_path: &str, new_path: &str) -> Result<(), SmbError>;

    async fn open(
        &mut self,
        share: &str,
        path: &str,
        disposition: Disposition,
        access: Access,
    ) -> Result<OpenedFile, SmbError>;

    async fn read(&mut self, fid: FileId, offset: u64, len: usize) -> Result<Bytes, SmbError>;

    async fn write(&mut self, fid: FileId, offset: u64, data: &[u8]) -> Result<usize, SmbError>;

    /// Current end-of-file of an open file / 文件长度
    async fn query_size(&mut self, fid: FileId) -> Result<u64, SmbError>;

    async fn close_file(&mut self, fid: FileId) -> Result<(), SmbError>;

    async fn logoff(&mut self) -> Result<(), SmbError>;
}

/// Opens authenticated connections / 建立连接
#[async_trait]
pub trait SmbConnector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn SmbConnection>, SmbError>;
}

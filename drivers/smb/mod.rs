//! SMB/CIFS 网络共享驱动
//!
//! Exposes an SMB server as a filesystem: `/` lists the disk shares and
//! each share is a top-level directory. The wire protocol sits behind
//! [`client::SmbConnector`]; name lookups behind [`resolver::NameResolver`].

pub mod client;
pub mod driver;
pub mod errors;
pub mod file;
pub mod info;
pub mod memory;
pub mod path;
pub mod resolver;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod tests;

pub use driver::SmbFs;
pub use memory::{MemoryNameResolver, MemoryServer};
pub use resolver::{HostToken, NameResolver, SystemNameResolver};
pub use session::{SessionSettings, SessionStatus};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FsUrl;
use crate::storage::{DriverBox, DriverFactory, FileSystem, FsError, FsResult};
use client::SmbConnector;

/// SMB 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmbConfig {
    /// 主机名、IP 或 `name,ip` 对
    pub host: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: String,
    /// 端口（默认 NetBIOS 139，直连 445）
    pub port: Option<u16>,
    /// 使用直连 TCP 传输
    #[serde(default)]
    pub direct_tcp: bool,
    /// 超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// 服务器 NetBIOS 名称，与 host 中的地址配对使用
    pub hostname: Option<String>,
    /// 本地 NetBIOS 名称
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// 根目录
    #[serde(default = "default_root")]
    pub root_path: String,
    /// 根目录不存在时自动创建
    #[serde(default)]
    pub create: bool,
}

fn default_username() -> String {
    "guest".to_string()
}

fn default_timeout() -> f64 {
    15.0
}

fn default_client_name() -> String {
    "SMBFS".to_string()
}

fn default_root() -> String {
    "/".to_string()
}

impl SmbConfig {
    /// Build from `smb://[user[:pass]@]host[:port][/path][?timeout=..&hostname=..&direct-tcp=..]` / 从 URL 构建
    pub fn from_url(url: &FsUrl) -> FsResult<Self> {
        let timeout = match url.param(&["timeout"]) {
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| FsError::InvalidUrl(format!("bad timeout '{}'", raw)))?,
            None => default_timeout(),
        };
        let port = match (url.port, url.param(&["port"])) {
            (Some(port), _) => Some(port),
            (None, Some(raw)) => Some(
                raw.parse::<u16>()
                    .map_err(|_| FsError::InvalidUrl(format!("bad port '{}'", raw)))?,
            ),
            (None, None) => None,
        };

        Ok(Self {
            host: url.host.clone(),
            username: url.username.clone().unwrap_or_else(default_username),
            password: url.password.clone().unwrap_or_default(),
            domain: url.param(&["domain"]).unwrap_or_default().to_string(),
            port,
            direct_tcp: url.flag(&["direct-tcp", "direct_tcp"]),
            timeout,
            hostname: url.param(&["hostname"]).map(str::to_string),
            client_name: url
                .param(&["client-name", "client_name"])
                .map(str::to_string)
                .unwrap_or_else(default_client_name),
            root_path: url.path.clone(),
            create: false,
        })
    }

    /// `hostname` pairs with `host` so no lookup is needed / 主机标记
    pub fn host_token(&self) -> HostToken {
        match &self.hostname {
            Some(hostname) => HostToken::pair(Some(hostname), Some(&self.host)),
            None => HostToken::parse(&self.host),
        }
    }

    pub fn settings(&self) -> FsResult<SessionSettings> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| FsError::InvalidArgument(format!("timeout must be positive, got {}", self.timeout)))?;
        Ok(SessionSettings {
            host: self.host_token(),
            username: self.username.clone(),
            password: self.password.clone(),
            domain: self.domain.clone(),
            client_name: self.client_name.clone(),
            port: self.port,
            direct_tcp: self.direct_tcp,
            timeout,
        })
    }
}

/// SMB 驱动工厂
pub struct SmbDriverFactory {
    connector: Arc<dyn SmbConnector>,
    names: Arc<dyn NameResolver>,
}

impl SmbDriverFactory {
    /// Factory resolving names through the system resolver / 使用系统名称解析
    pub fn new(connector: Arc<dyn SmbConnector>) -> Self {
        Self {
            connector,
            names: Arc::new(SystemNameResolver),
        }
    }

    pub fn with_name_resolver(mut self, names: Arc<dyn NameResolver>) -> Self {
        self.names = names;
        self
    }

    /// Connect, then narrow to `root_path` (creating it if asked) / 连接并打开根目录
    pub async fn open(&self, config: SmbConfig) -> FsResult<DriverBox> {
        let settings = config.settings().map_err(FsError::create_failed)?;
        let fs = Arc::new(SmbFs::connect(settings, self.connector.clone(), self.names.clone()).await?);

        let root = crate::utils::fix_and_clean_path(&config.root_path);
        if root == "/" {
            let driver: DriverBox = fs;
            return Ok(driver);
        }

        match fs.getinfo(&root, &[]).await {
            Ok(info) if info.is_dir() => {}
            Ok(_) => return Err(FsError::create_failed(format!("{} is not a directory", root))),
            Err(e) if e.is_not_found() && config.create => {
                tracing::info!("SMB: creating root directory {}", root);
                fs.makedirs(&root, true).await.map_err(FsError::create_failed)?;
            }
            Err(e) => return Err(FsError::create_failed(format!("{}: {}", root, e))),
        }
        let sub: DriverBox = Arc::new(fs.opendir(&root).await.map_err(FsError::create_failed)?);
        Ok(sub)
    }
}

#[async_trait]
impl DriverFactory for SmbDriverFactory {
    fn driver_type(&self) -> &'static str {
        "smb"
    }

    fn display_name(&self) -> &'static str {
        "SMB/CIFS"
    }

    async fn create_driver(&self, config: Value) -> FsResult<DriverBox> {
        let config: SmbConfig = serde_json::from_value(config)
            .map_err(|e| FsError::create_failed(format!("配置解析失败: {}", e)))?;
        self.open(config).await
    }

    async fn open_url(&self, url: &str, create: bool) -> FsResult<DriverBox> {
        let url = FsUrl::parse(url)?;
        let mut config = SmbConfig::from_url(&url)?;
        config.create = create;
        self.open(config).await
    }
}

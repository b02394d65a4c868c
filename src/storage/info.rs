//! Resource info model / 资源信息模型
//!
//! Metadata is grouped into namespaces. `basic` is always present; the
//! other groups are only filled in when the caller asked for them and the
//! driver could supply them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::FsError;

/// Info namespace / 信息命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Name, kind, size and timestamps / 基本信息
    Basic,
    /// Owner, group and permission bits / 访问控制信息
    Access,
    /// Protocol-specific attribute flags / SMB 属性
    Smb,
}

impl FromStr for Namespace {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Namespace::Basic),
            "access" => Ok(Namespace::Access),
            "smb" => Ok(Namespace::Smb),
            other => Err(FsError::InvalidArgument(format!("unknown namespace '{}'", other))),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Basic => write!(f, "basic"),
            Namespace::Access => write!(f, "access"),
            Namespace::Smb => write!(f, "smb"),
        }
    }
}

/// Requested namespaces, `basic` is implied / 请求的命名空间集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamespaceSet {
    pub access: bool,
    pub smb: bool,
}

impl NamespaceSet {
    pub fn from_slice(namespaces: &[Namespace]) -> Self {
        let mut set = Self::default();
        for ns in namespaces {
            match ns {
                Namespace::Basic => {}
                Namespace::Access => set.access = true,
                Namespace::Smb => set.smb = true,
            }
        }
        set
    }

    pub fn all() -> Self {
        Self { access: true, smb: true }
    }
}

/// Resource type / 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    File,
    Directory,
    /// Top-level share on the server, behaves as a directory / 共享
    Share,
}

impl ResourceType {
    pub fn is_dir(&self) -> bool {
        matches!(self, ResourceType::Directory | ResourceType::Share)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub name: String,
    pub kind: ResourceType,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateTime<Utc>>,
}

/// Permission bits for the owner and for everyone else / 权限位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub user_read: bool,
    pub user_write: bool,
    pub user_exec: bool,
    pub other_read: bool,
    pub other_write: bool,
    pub other_exec: bool,
}

impl Permissions {
    /// Unix-style mode (group bits mirror "other") / Unix 风格权限
    pub fn mode(&self) -> u32 {
        let triple = |r: bool, w: bool, x: bool| (r as u32) << 2 | (w as u32) << 1 | x as u32;
        let user = triple(self.user_read, self.user_write, self.user_exec);
        let other = triple(self.other_read, self.other_write, self.other_exec);
        user << 6 | other << 3 | other
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "{}{}{}{}{}{}",
            flag(self.user_read, 'r'),
            flag(self.user_write, 'w'),
            flag(self.user_exec, 'x'),
            flag(self.other_read, 'r'),
            flag(self.other_write, 'w'),
            flag(self.other_exec, 'x'),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccessInfo {
    /// Owning principal (security identifier) / 所有者
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmbInfo {
    pub hidden: bool,
    pub system: bool,
    pub archive: bool,
    pub read_only: bool,
    /// Raw FILE_ATTRIBUTE_* mask / 原始属性掩码
    pub attributes: u32,
}

/// Resource info / 资源信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub basic: BasicInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smb: Option<SmbInfo>,
}

impl Info {
    pub fn new(basic: BasicInfo) -> Self {
        Self {
            basic,
            access: None,
            smb: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.basic.name
    }

    pub fn kind(&self) -> ResourceType {
        self.basic.kind
    }

    pub fn is_dir(&self) -> bool {
        self.basic.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.basic.kind == ResourceType::File
    }

    pub fn size(&self) -> u64 {
        self.basic.size
    }

    pub fn has_namespace(&self, namespace: Namespace) -> bool {
        match namespace {
            Namespace::Basic => true,
            Namespace::Access => self.access.is_some(),
            Namespace::Smb => self.smb.is_some(),
        }
    }

    /// Owner SID, if the access namespace was filled in / 所有者 SID
    pub fn uid(&self) -> Option<&str> {
        self.access.as_ref().and_then(|a| a.uid.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_parse() {
        assert_eq!("basic".parse::<Namespace>().unwrap(), Namespace::Basic);
        assert_eq!("SMB".parse::<Namespace>().unwrap(), Namespace::Smb);
        assert!("details".parse::<Namespace>().is_err());

        let set = NamespaceSet::from_slice(&[Namespace::Basic, Namespace::Access]);
        assert!(set.access);
        assert!(!set.smb);
    }

    #[test]
    fn test_permissions_mode() {
        let perms = Permissions {
            user_read: true,
            user_write: true,
            other_read: true,
            ..Default::default()
        };
        assert_eq!(perms.mode(), 0o644);
        assert_eq!(perms.to_string(), "rw-r--");
    }

    #[test]
    fn test_share_counts_as_directory() {
        assert!(ResourceType::Share.is_dir());
        assert!(ResourceType::Directory.is_dir());
        assert!(!ResourceType::File.is_dir());
    }
}

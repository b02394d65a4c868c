//! Native records -> generic info / 元数据转换

use chrono::{DateTime, TimeZone, Utc};

use super::client::{access_mask, attributes, AceType, SecurityDescriptor, SharedFile, Sid};
use crate::storage::{AccessInfo, BasicInfo, Info, NamespaceSet, Permissions, ResourceType, SmbInfo};

/// Seconds between 1601-01-01 and 1970-01-01 / FILETIME 与 Unix 纪元差
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;
const TICKS_PER_SECOND: u64 = 10_000_000;

/// FILETIME ticks -> UTC, `None` for the zero value / FILETIME 转 UTC
pub fn filetime_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    let secs = (ticks / TICKS_PER_SECOND) as i64 - FILETIME_UNIX_OFFSET;
    let nanos = ((ticks % TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

pub fn datetime_to_filetime(time: DateTime<Utc>) -> u64 {
    let secs = (time.timestamp() + FILETIME_UNIX_OFFSET).max(0) as u64;
    secs * TICKS_PER_SECOND + u64::from(time.timestamp_subsec_nanos()) / 100
}

pub fn now_filetime() -> u64 {
    datetime_to_filetime(Utc::now())
}

#[derive(Default)]
struct Rights {
    read: bool,
    write: bool,
    exec: bool,
}

impl Rights {
    fn from_mask(mask: u32) -> Self {
        let any = |bits: u32| mask & bits != 0;
        Self {
            read: any(access_mask::FILE_READ_DATA | access_mask::GENERIC_READ | access_mask::GENERIC_ALL),
            write: any(
                access_mask::FILE_WRITE_DATA
                    | access_mask::FILE_APPEND_DATA
                    | access_mask::GENERIC_WRITE
                    | access_mask::GENERIC_ALL,
            ),
            exec: any(access_mask::FILE_EXECUTE | access_mask::GENERIC_EXECUTE | access_mask::GENERIC_ALL),
        }
    }
}

/// Effective rights of `who` from the DACL: allowed minus denied / 计算有效权限
fn effective_rights(sd: &SecurityDescriptor, who: &[&Sid]) -> Rights {
    let mut allowed = 0u32;
    let mut denied = 0u32;
    for ace in sd.dacl.iter().filter(|ace| who.contains(&&ace.sid)) {
        match ace.ace_type {
            AceType::AccessAllowed => allowed |= ace.mask,
            AceType::AccessDenied => denied |= ace.mask,
        }
    }
    let allowed = Rights::from_mask(allowed);
    let denied = Rights::from_mask(denied);
    Rights {
        read: allowed.read && !denied.read,
        write: allowed.write && !denied.write,
        exec: allowed.exec && !denied.exec,
    }
}

pub fn permissions_from_security(sd: &SecurityDescriptor) -> Permissions {
    let everyone = Sid::everyone();
    let user = match &sd.owner {
        Some(owner) => effective_rights(sd, &[owner, &everyone]),
        None => Rights::default(),
    };
    let other = effective_rights(sd, &[&everyone]);
    Permissions {
        user_read: user.read,
        user_write: user.write,
        user_exec: user.exec,
        other_read: other.read,
        other_write: other.write,
        other_exec: other.exec,
    }
}

pub fn access_info(sd: &SecurityDescriptor) -> AccessInfo {
    AccessInfo {
        uid: sd.owner.as_ref().map(|sid| sid.0.clone()),
        gid: sd.group.as_ref().map(|sid| sid.0.clone()),
        permissions: Some(permissions_from_security(sd)),
    }
}

/// Missing attribute mask reads as all flags false / 属性缺失时全部为 false
pub fn smb_info(file_attributes: Option<u32>) -> SmbInfo {
    let mask = file_attributes.unwrap_or(0);
    SmbInfo {
        hidden: mask & attributes::HIDDEN != 0,
        system: mask & attributes::SYSTEM != 0,
        archive: mask & attributes::ARCHIVE != 0,
        read_only: mask & attributes::READONLY != 0,
        attributes: mask,
    }
}

/// Info for a file or directory inside a share / 共享内条目
pub fn entry_info(
    name: &str,
    record: &SharedFile,
    namespaces: NamespaceSet,
    security: Option<&SecurityDescriptor>,
) -> Info {
    let kind = if record.is_directory {
        ResourceType::Directory
    } else {
        ResourceType::File
    };
    Info {
        basic: BasicInfo {
            name: name.to_string(),
            kind,
            size: if record.is_directory { 0 } else { record.file_size },
            created: filetime_to_datetime(record.create_time),
            modified: filetime_to_datetime(record.last_write_time),
            accessed: filetime_to_datetime(record.last_access_time),
        },
        access: security.filter(|_| namespaces.access).map(access_info),
        smb: namespaces.smb.then(|| smb_info(record.file_attributes)),
    }
}

/// Info for a share, seen as a top-level directory / 共享信息
pub fn share_info(name: &str, namespaces: NamespaceSet, security: Option<&SecurityDescriptor>) -> Info {
    Info {
        basic: BasicInfo {
            name: name.to_string(),
            kind: ResourceType::Share,
            size: 0,
            created: None,
            modified: None,
            accessed: None,
        },
        access: security.filter(|_| namespaces.access).map(access_info),
        smb: namespaces
            .smb
            .then(|| smb_info(Some(attributes::DIRECTORY))),
    }
}

/// Synthetic info for `/`, no request needed / 根目录信息
pub fn root_info() -> Info {
    Info::new(BasicInfo {
        name: String::new(),
        kind: ResourceType::Directory,
        size: 0,
        created: None,
        modified: None,
        accessed: None,
    })
}

//! Connection URL module / 连接 URL 模块
//!
//! Parses filesystem URLs of the form
//! `scheme://[user[:password]@]host[:port][/path][?key=value&...]`.
//! The host part is kept verbatim so drivers can apply their own
//! conventions (e.g. `name,address` pairs).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::storage::{FsError, FsResult};
use crate::utils;

/// Parsed filesystem URL / 解析后的文件系统 URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsUrl {
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Raw host text / 原始主机文本
    pub host: String,
    pub port: Option<u16>,
    /// Decoded path, always starts with / / 路径
    pub path: String,
    pub params: HashMap<String, String>,
}

impl FsUrl {
    pub fn parse(raw: &str) -> FsResult<Self> {
        let url = Url::parse(raw).map_err(|e| FsError::InvalidUrl(format!("{}: {}", raw, e)))?;

        let decode = |s: &str| -> FsResult<String> {
            urlencoding::decode(s)
                .map(|c| c.into_owned())
                .map_err(|e| FsError::InvalidUrl(format!("{}: {}", raw, e)))
        };

        let username = match url.username() {
            "" => None,
            name => Some(decode(name)?),
        };
        let password = url.password().map(decode).transpose()?;

        // IPv6 literals come back bracketed / IPv6 地址带方括号
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .map(decode)
            .transpose()?
            .unwrap_or_default();

        let path = utils::fix_and_clean_path(&decode(url.path())?);

        let params = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            username,
            password,
            host,
            port: url.port(),
            path,
            params,
        })
    }

    /// Query parameter by any of its accepted spellings / 获取查询参数
    pub fn param(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.params.get(*key))
            .map(String::as_str)
    }

    /// Boolean query flag, absent means false / 布尔查询参数
    pub fn flag(&self, keys: &[&str]) -> bool {
        self.param(keys).map(utils::parse_flag).unwrap_or(false)
    }
}

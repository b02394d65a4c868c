//! Host token resolution / 主机解析
//!
//! A host is given as a single name-or-address or as an ordered pair of
//! them. Resolution yields connectable candidates in order; the session
//! manager tries them until one logs in.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use super::client::SmbError;

/// Remote name accepted by servers when the real NetBIOS name is unknown
pub const WILDCARD_SERVER_NAME: &str = "*SMBSERVER";

/// Host token / 主机标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostToken {
    Single(String),
    /// Ordered pair, either slot may be absent / 有序对
    Pair(Option<String>, Option<String>),
}

impl HostToken {
    pub fn pair(first: Option<&str>, second: Option<&str>) -> Self {
        HostToken::Pair(first.map(str::to_string), second.map(str::to_string))
    }

    /// Parse `host` or `first,second` / 解析主机文本
    pub fn parse(text: &str) -> Self {
        let slot = |s: &str| {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        match text.split_once(',') {
            Some((first, second)) => HostToken::Pair(slot(first), slot(second)),
            None => match slot(text) {
                Some(host) => HostToken::Single(host),
                None => HostToken::Pair(None, None),
            },
        }
    }
}

/// Name resolution capability (NetBIOS-style queries) / 名称解析能力
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn query_address_for_name(&self, name: &str, timeout: Duration) -> Option<IpAddr>;

    async fn query_name_for_address(&self, address: IpAddr, timeout: Duration) -> Option<String>;
}

/// Resolver backed by the system resolver (hosts file, DNS, WINS via nsswitch).
/// Reverse NetBIOS node-status queries are not available through it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNameResolver;

#[async_trait]
impl NameResolver for SystemNameResolver {
    async fn query_address_for_name(&self, name: &str, timeout: Duration) -> Option<IpAddr> {
        lookup_dns(name, timeout).await.ok()
    }

    async fn query_name_for_address(&self, _address: IpAddr, _timeout: Duration) -> Option<String> {
        None
    }
}

/// Standard network stack lookup / 系统 DNS 查询
pub async fn lookup_dns(name: &str, timeout: Duration) -> Result<IpAddr, SmbError> {
    let lookup = tokio::net::lookup_host((name, 0u16));
    let mut addrs = tokio::time::timeout(timeout, lookup)
        .await
        .map_err(|_| SmbError::ConnectionSetup(format!("DNS lookup of {} timed out", name)))?
        .map_err(|e| SmbError::ConnectionSetup(format!("DNS lookup of {} failed: {}", name, e)))?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| SmbError::ConnectionSetup(format!("{} has no address", name)))
}

/// One connection attempt / 连接候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Literal address, with the remote name if it is already known
    Address { address: IpAddr, name: Option<String> },
    /// Name that still needs a lookup
    Name(String),
}

/// Resolved connection target / 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: IpAddr,
    pub server_name: String,
}

fn classify(token: &str) -> Candidate {
    match token.parse::<IpAddr>() {
        Ok(address) => Candidate::Address { address, name: None },
        Err(_) => Candidate::Name(token.to_string()),
    }
}

/// Expand a host token into ordered candidates, no network involved / 展开候选
///
/// A pair made of one name and one address is a single candidate: the
/// address is dialled and the name used as remote name, so no lookup is
/// needed. Other pairs fall back from the first slot to the second.
pub fn candidates(token: &HostToken) -> Result<Vec<Candidate>, SmbError> {
    let list = match token {
        HostToken::Single(host) => vec![classify(host)],
        HostToken::Pair(first, second) => {
            let first = first.as_deref().map(classify);
            let second = second.as_deref().map(classify);
            match (first, second) {
                (Some(Candidate::Name(name)), Some(Candidate::Address { address, .. }))
                | (Some(Candidate::Address { address, .. }), Some(Candidate::Name(name))) => {
                    vec![Candidate::Address {
                        address,
                        name: Some(name),
                    }]
                }
                (first, second) => first.into_iter().chain(second).collect(),
            }
        }
    };

    if list.is_empty() {
        return Err(SmbError::ConnectionSetup("no host given".to_string()));
    }
    Ok(list)
}

/// Turns candidates into endpoints / 候选解析器
#[derive(Clone)]
pub struct HostResolver {
    names: Arc<dyn NameResolver>,
    direct_tcp: bool,
    timeout: Duration,
}

impl HostResolver {
    pub fn new(names: Arc<dyn NameResolver>, direct_tcp: bool, timeout: Duration) -> Self {
        Self {
            names,
            direct_tcp,
            timeout,
        }
    }

    pub async fn resolve(&self, candidate: &Candidate) -> Result<Endpoint, SmbError> {
        match candidate {
            Candidate::Address {
                address,
                name: Some(name),
            } => Ok(Endpoint {
                address: *address,
                server_name: name.clone(),
            }),
            Candidate::Address { address, name: None } => {
                let server_name = if self.direct_tcp {
                    address.to_string()
                } else {
                    match self.names.query_name_for_address(*address, self.timeout).await {
                        Some(name) => name,
                        None => {
                            tracing::debug!("SMB: no NetBIOS name for {}, using {}", address, WILDCARD_SERVER_NAME);
                            WILDCARD_SERVER_NAME.to_string()
                        }
                    }
                };
                Ok(Endpoint {
                    address: *address,
                    server_name,
                })
            }
            Candidate::Name(name) => {
                let address = if self.direct_tcp {
                    lookup_dns(name, self.timeout).await?
                } else {
                    self.names
                        .query_address_for_name(name, self.timeout)
                        .await
                        .ok_or_else(|| SmbError::ConnectionSetup(format!("cannot resolve NetBIOS name {}", name)))?
                };
                Ok(Endpoint {
                    address,
                    server_name: name.clone(),
                })
            }
        }
    }
}

use ledger_core::consensus::ChainSource;
use ledger_core::{ChainSnapshot, PeerError};
use reqwest::{Client, StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid node address {address:?}: {reason}")]
    Invalid { address: String, reason: String },

    #[error("node address {0:?} has no host")]
    MissingHost(String),
}

/// Reduce `http://host:port/anything` or bare `host:port` to `host:port`.
/// A missing or default port is spelled out with the scheme's known port.
pub fn normalize_address(address: &str) -> Result<String, AddressError> {
    let trimmed = address.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| AddressError::Invalid {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AddressError::MissingHost(address.to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| AddressError::Invalid {
            address: address.to_string(),
            reason: format!("no known port for scheme {}", url.scheme()),
        })?;
    Ok(format!("{host}:{port}"))
}

/// Fetches `GET http://{peer}/chain` from other nodes.
#[derive(Clone, Debug)]
pub struct HttpChainSource {
    client: Client,
}

impl HttpChainSource {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ChainSource for HttpChainSource {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<ChainSnapshot, PeerError>> + Send {
        let client = self.client.clone();
        let peer = peer.to_string();
        async move {
            let url = format!("http://{peer}/chain");
            debug!(%url, "fetching peer chain");
            let res = client
                .get(&url)
                .send()
                .await
                .map_err(|e| PeerError::Unreachable {
                    peer: peer.clone(),
                    reason: e.to_string(),
                })?;
            let status = res.status();
            if status != StatusCode::OK {
                return Err(PeerError::Status {
                    peer,
                    status: status.as_u16(),
                });
            }
            res.json::<ChainSnapshot>()
                .await
                .map_err(|e| PeerError::InvalidResponse {
                    peer,
                    reason: e.to_string(),
                })
        }
    }
}

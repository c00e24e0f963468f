use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::http::build_http_client;

/// A conditional GET.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub etag: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum FetchResponse {
    NotModified,
    Body {
        bytes: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<DateTime<Utc>>,
    },
}

/// Transport used by the fetcher. The network lives behind this seam so the
/// pipeline can be driven without it.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> ProvisionResult<FetchResponse>;
}

/// `RemoteSource` over HTTP.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> ProvisionResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch(&self, request: &FetchRequest) -> ProvisionResult<FetchResponse> {
        let mut builder = self.client.get(&request.url);
        if let Some(etag) = &request.etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        if let Some(since) = request.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, http_date(since));
        }

        let response = builder.send().await.map_err(|e| network_failure(&request.url, e))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!("Not modified: {}", request.url);
            return Ok(FetchResponse::NotModified);
        }
        if status.is_server_error() {
            return Err(ProvisionError::NetworkFailure {
                url: request.url.clone(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(ProvisionError::DownloadFailed {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_failure(&request.url, e))?;
        Ok(FetchResponse::Body {
            bytes: bytes.to_vec(),
            etag,
            last_modified,
        })
    }
}

fn network_failure(url: &str, e: reqwest::Error) -> ProvisionError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        ProvisionError::NetworkFailure {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        ProvisionError::Http(e)
    }
}

/// RFC 7231 IMF-fixdate.
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

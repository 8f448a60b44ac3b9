//! Default prober backed by the curl crate (libcurl).
//!
//! One blocking request per attempt. Bare hosts are tried over https, then
//! http; transport errors are retried per `RetryPolicy` before falling back
//! to the next candidate URL.

use std::str;
use std::time::Duration;

use crate::error::ProbeError;
use crate::result::ProbeRecord;
use crate::retry::{classify_curl_error, run_with_retry, RetryPolicy};
use crate::target;

use super::extract::{build_record, RawResponse};
use super::parse::ResponseHeaders;
use super::{ProbeRequest, Prober};

/// User agent sent when the request does not carry one.
pub const DEFAULT_USER_AGENT: &str = concat!("hprobe/", env!("CARGO_PKG_VERSION"));

/// Transport settings for `CurlProber`.
#[derive(Debug, Clone)]
pub struct CurlSettings {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    /// Bodies are truncated to this many bytes before hashing and counting.
    pub max_body_bytes: usize,
    /// Verify TLS certificates. Off by default.
    pub verify_tls: bool,
    pub user_agent: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for CurlSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            follow_redirects: true,
            max_redirects: 10,
            max_body_bytes: 1024 * 1024,
            verify_tls: false,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurlProber {
    settings: CurlSettings,
}

impl CurlProber {
    pub fn new(settings: CurlSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CurlSettings {
        &self.settings
    }

    /// One request against one URL.
    fn fetch(&self, url: &str, request: &ProbeRequest) -> Result<RawResponse, curl::Error> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        match request.method.as_str() {
            "GET" => easy.get(true)?,
            "HEAD" => easy.nobody(true)?,
            "POST" => {
                easy.post(true)?;
                easy.post_field_size(0)?;
            }
            other => easy.custom_request(other)?,
        }
        easy.follow_location(self.settings.follow_redirects)?;
        if self.settings.follow_redirects {
            easy.max_redirections(self.settings.max_redirects)?;
        }
        easy.connect_timeout(self.settings.connect_timeout)?;
        easy.timeout(self.settings.timeout)?;
        easy.ssl_verify_peer(self.settings.verify_tls)?;
        easy.ssl_verify_host(self.settings.verify_tls)?;
        // Empty string: accept every encoding libcurl can decode.
        easy.accept_encoding("")?;
        let agent = request
            .user_agent
            .as_deref()
            .or(self.settings.user_agent.as_deref());
        if let Some(agent) = agent {
            easy.useragent(agent)?;
        }

        let cap = self.settings.max_body_bytes;
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                let room = cap.saturating_sub(body.len());
                if data.len() > room {
                    body.extend_from_slice(&data[..room]);
                    truncated = true;
                    // Short write: libcurl aborts the transfer with a write error.
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()
        };
        match performed {
            Ok(()) => {}
            Err(e) if truncated && e.is_write_error() => {}
            Err(e) => return Err(e),
        }

        let status = easy.response_code()?;
        let effective_url = easy.effective_url()?.map(str::to_string);
        Ok(RawResponse {
            status,
            headers: ResponseHeaders::parse(&header_lines),
            body,
            effective_url,
        })
    }
}

impl Prober for CurlProber {
    fn probe(&self, request: &ProbeRequest) -> Result<ProbeRecord, ProbeError> {
        let mut last_error = None;
        for url in target::candidate_urls(&request.target)? {
            let attempt = run_with_retry(&self.settings.retry, classify_curl_error, || {
                self.fetch(&url, request)
            });
            match attempt {
                Ok(response) => {
                    return Ok(build_record(url, &request.method, response, request.detect_cdn))
                }
                Err(e) => {
                    tracing::debug!(host = %request.target, url = %url, error = %e, "probe attempt failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(ProbeError::transport(classify_curl_error(&e), e.to_string())),
            None => Err(ProbeError::invalid_target(
                request.target.as_str(),
                "no candidate URL",
            )),
        }
    }
}

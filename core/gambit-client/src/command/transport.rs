//! HTTP transport seam for the command client.
//!
//! [`HttpTransport`] keeps the command client independent of the HTTP stack
//! so tests can substitute a recording double. [`ReqwestTransport`] is the
//! production implementation on top of `reqwest::blocking`.

use crate::error::{ClientError, Result};
use fs_err as fs;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("gambit-client/", env!("CARGO_PKG_VERSION"));
/// Uploads carry whole flight logs and orthomaps; they get their own ceiling.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Receives upload progress as a percentage in `0.0..=100.0`.
pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpTransport: Send + Sync {
    /// Performs one request. `Err` means the exchange itself failed
    /// (connection refused, timeout, truncated body); any HTTP status is `Ok`.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Posts `file_path` as multipart field `file`, reporting progress as
    /// bytes leave the client. Failures surface as [`ClientError::Upload`].
    fn upload(&self, request: UploadRequest, progress: Option<ProgressFn>)
        -> Result<HttpResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ClientError::Config(format!("Failed to create HTTP client: {}", err)))?;
        Ok(Self { client, timeout })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };
        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|err| {
            if err.is_timeout() {
                ClientError::network(format!(
                    "Request to {} timed out after {}s",
                    request.url.path(),
                    self.timeout.as_secs()
                ))
            } else {
                ClientError::network(format!("Request failed: {}", err))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| ClientError::network(format!("Failed to read response: {}", err)))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn upload(
        &self,
        request: UploadRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse> {
        let file = fs::File::open(&request.file_path)
            .map_err(|err| ClientError::Upload(err.to_string()))?;
        let total = file
            .metadata()
            .map_err(|err| ClientError::Upload(err.to_string()))?
            .len();
        let file_name = request
            .file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let reader = ProgressReader::new(file, total, progress);
        let part = Part::reader_with_length(reader, total).file_name(file_name);
        let form = Form::new().part("file", part);

        let mut builder = self
            .client
            .post(request.url)
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .map_err(|err| ClientError::Upload(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| ClientError::Upload(err.to_string()))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Reader adapter that reports the share of `total` read so far.
pub(crate) struct ProgressReader<R> {
    inner: R,
    total: u64,
    sent: u64,
    progress: Option<ProgressFn>,
}

impl<R: Read> ProgressReader<R> {
    pub(crate) fn new(inner: R, total: u64, progress: Option<ProgressFn>) -> Self {
        Self {
            inner,
            total,
            sent: 0,
            progress,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent = self.sent.saturating_add(n as u64);
            // Unknown length: nothing meaningful to report.
            if self.total > 0 {
                if let Some(progress) = self.progress.as_mut() {
                    let percent = (self.sent as f64 / self.total as f64) * 100.0;
                    progress(percent.min(100.0));
                }
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn drain<R: Read>(mut reader: R, chunk: usize) {
        let mut buf = vec![0u8; chunk];
        while reader.read(&mut buf).unwrap() > 0 {}
    }

    #[test]
    fn progress_reader_reports_percentages_up_to_100() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let reader = ProgressReader::new(
            Cursor::new(vec![7u8; 400]),
            400,
            Some(Box::new(move |percent: f64| {
                seen_clone.lock().unwrap().push(percent)
            })),
        );
        drain(reader, 100);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn progress_reader_is_silent_for_unknown_length() {
        let calls = Arc::new(Mutex::new(0usize));
        let calls_clone = Arc::clone(&calls);
        let reader = ProgressReader::new(
            Cursor::new(vec![1u8; 10]),
            0,
            Some(Box::new(move |_: f64| *calls_clone.lock().unwrap() += 1)),
        );
        drain(reader, 4);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: Url::parse("http://localhost:8000/health").unwrap(),
            headers: vec![("Authorization".to_string(), "Bearer abc".to_string())],
            body: None,
        };
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
        assert_eq!(request.header("content-type"), None);
    }

    #[test]
    fn transport_builds_with_timeout() {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        assert_eq!(transport.timeout, Duration::from_secs(5));
    }
}

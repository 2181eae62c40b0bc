//! Command client: token-authenticated request/response calls against the
//! backend's REST surface.
//!
//! Every call attaches `Authorization: Bearer <token>` when a token is held.
//! Non-2xx responses become [`ClientError::Request`] carrying the backend's
//! error body; an unreadable error body falls back to the generic network
//! error shape. Calls are independent: there is no queue, no cancellation and
//! no timeout beyond the transport's own.

mod transport;

pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ProgressFn, ReqwestTransport,
    UploadRequest,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::token::TokenStore;
use gambit_protocol::{
    AuthResponse, ErrorResponse, Flight, FlightQuery, LoginRequest, Mission, Setting,
    SettingUpdate, SettingValue, SystemHealth, UploadReceipt, UploadStatus, User,
    VIDEO_STREAM_PATH,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, RwLock};
use url::Url;

const FALLBACK_DETAIL: &str = "Request failed";

pub struct CommandClient {
    base: Url,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenStore>,
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for CommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl CommandClient {
    /// Builds a client over the production HTTP transport.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::with_transport(
            config.api_base()?,
            Arc::new(transport),
            tokens,
        ))
    }

    /// Builds a client over any transport. Reads the persisted token once.
    pub fn with_transport(
        base: Url,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let token = tokens.load();
        if token.is_some() {
            tracing::debug!("Recovered persisted session token");
        }
        Self {
            base,
            transport,
            tokens,
            token: RwLock::new(token),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────

    /// Exchanges credentials for a session token and stores it.
    pub fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let body = json_body(&LoginRequest { username, password })?;
        let response = self.send(HttpMethod::Post, self.endpoint(&["login"]), Some(body))?;
        if !response.is_success() {
            let error = parse_error_body(&response).unwrap_or_else(ErrorResponse::network_error);
            tracing::warn!(status = response.status, code = %error.code, "Login rejected");
            return Err(ClientError::Auth(error));
        }

        let auth: AuthResponse = decode_body(&response)?;
        self.set_token(Some(auth.access_token.clone()));
        if let Err(err) = self.tokens.save(&auth.access_token) {
            tracing::warn!(error = %err, "Failed to persist session token");
        }
        tracing::info!(username = %auth.user.username, role = ?auth.user.role, "Logged in");
        Ok(auth)
    }

    /// Drops the session locally. Makes no backend call; safe to repeat.
    pub fn logout(&self) {
        self.set_token(None);
        if let Err(err) = self.tokens.clear() {
            tracing::warn!(error = %err, "Failed to clear persisted session token");
        }
    }

    pub fn get_current_user(&self) -> Result<User> {
        self.get_json(&["user", "me"])
    }

    // ─────────────────────────────────────────────────────────────────────
    // Vehicle and mission
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_health(&self) -> Result<SystemHealth> {
        self.get_json(&["health"])
    }

    pub fn start_mission(&self) -> Result<Mission> {
        self.post_json(&["mission", "start"])
    }

    pub fn abort_mission(&self) -> Result<Mission> {
        self.post_json(&["mission", "abort"])
    }

    pub fn get_mission_status(&self) -> Result<Mission> {
        self.get_json(&["mission", "status"])
    }

    // ─────────────────────────────────────────────────────────────────────
    // Flights
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_flights(&self, query: FlightQuery) -> Result<Vec<Flight>> {
        let mut url = self.endpoint(&["flights"]);
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        let response = self.call(HttpMethod::Get, url, None)?;
        decode_body(&response)
    }

    pub fn get_flight_report(&self, flight_id: &str) -> Result<String> {
        let response = self.call(
            HttpMethod::Get,
            self.endpoint(&["flights", flight_id, "report"]),
            None,
        )?;
        String::from_utf8(response.body)
            .map_err(|err| ClientError::network(format!("Report is not valid UTF-8: {}", err)))
    }

    pub fn download_flight_logs(&self, flight_id: &str) -> Result<Vec<u8>> {
        let response = self.call(
            HttpMethod::Get,
            self.endpoint(&["flights", flight_id, "logs"]),
            None,
        )?;
        Ok(response.body)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Video
    // ─────────────────────────────────────────────────────────────────────

    pub fn start_recording(&self) -> Result<()> {
        self.call(
            HttpMethod::Post,
            self.endpoint(&["video", "record", "start"]),
            None,
        )
        .map(|_| ())
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.call(
            HttpMethod::Post,
            self.endpoint(&["video", "record", "stop"]),
            None,
        )
        .map(|_| ())
    }

    /// HLS playlist URL for the live feed. No request is made.
    pub fn video_stream_url(&self) -> Url {
        let segments: Vec<&str> = VIDEO_STREAM_PATH
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        self.endpoint(&segments)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_settings(&self) -> Result<Vec<Setting>> {
        self.get_json(&["settings"])
    }

    pub fn update_setting(&self, key: &str, value: SettingValue) -> Result<Setting> {
        let body = json_body(&SettingUpdate { value })?;
        let response = self.call(
            HttpMethod::Patch,
            self.endpoint(&["settings", key]),
            Some(body),
        )?;
        decode_body(&response)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Uploads
    // ─────────────────────────────────────────────────────────────────────

    /// Uploads a file and returns the server-assigned upload id.
    pub fn upload_file(&self, path: &Path, progress: Option<ProgressFn>) -> Result<String> {
        let request = UploadRequest {
            url: self.endpoint(&["upload"]),
            headers: self.auth_header().into_iter().collect(),
            file_path: path.to_path_buf(),
        };
        tracing::info!(path = %path.display(), "Uploading file");

        let response = self.transport.upload(request, progress)?;
        if response.status != 200 {
            return Err(ClientError::Upload(format!(
                "server answered HTTP {}",
                response.status
            )));
        }
        let receipt: UploadReceipt = serde_json::from_slice(&response.body)
            .map_err(|err| ClientError::Upload(format!("invalid upload receipt: {}", err)))?;
        tracing::info!(upload_id = %receipt.upload_id, "Upload accepted");
        Ok(receipt.upload_id)
    }

    pub fn get_upload_status(&self, upload_id: &str) -> Result<UploadStatus> {
        self.get_json(&["upload", upload_id, "status"])
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────

    fn set_token(&self, token: Option<String>) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.token()
            .map(|token| ("Authorization".to_string(), format!("Bearer {}", token)))
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self.call(HttpMethod::Get, self.endpoint(segments), None)?;
        decode_body(&response)
    }

    fn post_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self.call(HttpMethod::Post, self.endpoint(segments), None)?;
        decode_body(&response)
    }

    /// Sends a request and maps non-2xx statuses to typed errors.
    fn call(&self, method: HttpMethod, url: Url, body: Option<Vec<u8>>) -> Result<HttpResponse> {
        let response = self.send(method, url, body)?;
        if response.is_success() {
            return Ok(response);
        }

        match parse_error_body(&response) {
            Some(error) => {
                tracing::warn!(
                    status = response.status,
                    code = %error.code,
                    detail = %error.detail,
                    "Backend rejected request"
                );
                Err(ClientError::Request {
                    status: response.status,
                    error,
                })
            }
            None => {
                tracing::warn!(status = response.status, "Unreadable error body");
                Err(ClientError::Network {
                    detail: format!("HTTP {} with an unreadable error body", response.status),
                    error: ErrorResponse::network_error(),
                })
            }
        }
    }

    fn send(&self, method: HttpMethod, url: Url, body: Option<Vec<u8>>) -> Result<HttpResponse> {
        let mut headers = vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )];
        headers.extend(self.auth_header());

        tracing::debug!(method = ?method, path = %url.path(), "Sending request");
        self.transport.send(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

fn json_body<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|err| ClientError::network(format!("Failed to encode request: {}", err)))
}

fn decode_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body)
        .map_err(|err| ClientError::network(format!("Failed to parse response JSON: {}", err)))
}

fn parse_error_body(response: &HttpResponse) -> Option<ErrorResponse> {
    let mut error: ErrorResponse = serde_json::from_slice(&response.body).ok()?;
    if error.detail.trim().is_empty() {
        error.detail = FALLBACK_DETAIL.to_string();
    }
    Some(error)
}

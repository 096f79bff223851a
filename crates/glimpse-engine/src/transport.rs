use std::io;
use std::time::Duration;

use glimpse_contracts::stream::ChunkedLines;
use glimpse_contracts::ImageAsset;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{error_chain_text, truncate_text, Stage, TransportError};

pub const DEFAULT_API_BASE: &str = "https://api.dify.ai/v1";
pub const DEFAULT_QUERY: &str =
    "Analyze this image and provide a detailed description and value assessment";
pub const DEFAULT_USER: &str = "glimpse";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const ERROR_BODY_MAX_CHARS: usize = 512;

/// Raw response lines, in arrival order.
pub type LineStream = Box<dyn Iterator<Item = Result<String, TransportError>> + Send>;

/// Upload-then-analyze exchange with a vision service.
pub trait VisionTransport: Send + Sync {
    /// Uploads the image and returns the service's file id.
    fn upload(&self, image: &ImageAsset) -> Result<String, TransportError>;

    /// Starts an analysis of an uploaded file and hands back its event stream.
    fn analyze(&self, file_id: &str) -> Result<LineStream, TransportError>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub api_base: String,
    pub api_key: String,
    pub query: String,
    pub user: String,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            query: DEFAULT_QUERY.to_string(),
            user: DEFAULT_USER.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Self {
        let trimmed = api_base.as_ref().trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_base = trimmed.to_string();
        }
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("query", &self.query)
            .field("user", &self.user)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for the Dify-style `files/upload` + `chat-messages` API.
pub struct DifyClient {
    config: TransportConfig,
    http: HttpClient,
}

impl DifyClient {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| TransportError::Client {
                message: error_chain_text(&err, ERROR_BODY_MAX_CHARS),
            })?;
        Ok(Self { config, http })
    }

    /// Uses a caller-built client; `config.timeout` is then only used in error text.
    pub fn with_http(config: TransportConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base, path)
    }

    fn send_error(&self, stage: Stage, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout {
                stage,
                seconds: self.config.timeout.as_secs(),
            };
        }
        TransportError::Request {
            stage,
            message: error_chain_text(&err, ERROR_BODY_MAX_CHARS),
        }
    }
}

impl VisionTransport for DifyClient {
    fn upload(&self, image: &ImageAsset) -> Result<String, TransportError> {
        let name = image.display_name();
        let part = MultipartPart::bytes(image.bytes().to_vec())
            .file_name(name.to_string())
            .mime_str(mime_for_name(name).unwrap_or("image/jpeg"))
            .map_err(|err| TransportError::Request {
                stage: Stage::Upload,
                message: error_chain_text(&err, ERROR_BODY_MAX_CHARS),
            })?;
        let form = MultipartForm::new()
            .text("user", self.config.user.clone())
            .part("file", part);

        let response = self
            .http
            .post(self.endpoint("files/upload"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .map_err(|err| self.send_error(Stage::Upload, err))?;
        let payload = response_json_or_error(Stage::Upload, response)?;
        let file_id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TransportError::InvalidResponse {
                stage: Stage::Upload,
                message: "missing file id".to_string(),
            })?;
        debug!(image = name, file_id, "uploaded image");
        Ok(file_id.to_string())
    }

    fn analyze(&self, file_id: &str) -> Result<LineStream, TransportError> {
        let payload = json!({
            "inputs": {},
            "query": self.config.query,
            "response_mode": "streaming",
            "user": self.config.user,
            "files": [{
                "type": "image",
                "transfer_method": "local_file",
                "upload_file_id": file_id,
            }],
        });
        let response = self
            .http
            .post(self.endpoint("chat-messages"))
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .map_err(|err| self.send_error(Stage::Analyze, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                stage: Stage::Analyze,
                code: status.as_u16(),
                body: truncate_text(body.trim(), ERROR_BODY_MAX_CHARS),
            });
        }

        let seconds = self.config.timeout.as_secs();
        let lines = ChunkedLines::new(response).map(move |line| {
            line.map_err(|err| stream_error(&err, seconds))
        });
        Ok(Box::new(lines))
    }
}

fn response_json_or_error(stage: Stage, response: HttpResponse) -> Result<Value, TransportError> {
    let status = response.status();
    let body = response.text().map_err(|err| TransportError::InvalidResponse {
        stage,
        message: format!(
            "body read failed: {}",
            error_chain_text(&err, ERROR_BODY_MAX_CHARS)
        ),
    })?;
    if !status.is_success() {
        return Err(TransportError::Status {
            stage,
            code: status.as_u16(),
            body: truncate_text(body.trim(), ERROR_BODY_MAX_CHARS),
        });
    }
    serde_json::from_str(&body).map_err(|_| TransportError::InvalidResponse {
        stage,
        message: format!("not JSON: {}", truncate_text(body.trim(), 120)),
    })
}

fn stream_error(err: &io::Error, seconds: u64) -> TransportError {
    let timed_out = err.kind() == io::ErrorKind::TimedOut
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .map(reqwest::Error::is_timeout)
            .unwrap_or(false);
    if timed_out {
        return TransportError::Timeout {
            stage: Stage::Analyze,
            seconds,
        };
    }
    TransportError::Stream {
        message: error_chain_text(err, ERROR_BODY_MAX_CHARS),
    }
}

fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

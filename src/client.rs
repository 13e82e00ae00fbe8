use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::accumulating_stream::consume_stream;
use crate::error::{Error, Result};
use crate::ndjson::process_ndjson;
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::render::Renderer;
use crate::types::ChatRequest;

/// Upper bound on how long a single request may stay open, streaming included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// A boxed stream of response lines.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Something that can open a streaming chat request.
///
/// [`Ollama`] is the production implementation; tests substitute canned streams.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends `request` and returns the response as a stream of non-blank lines.
    ///
    /// A connection failure or non-success status fails here, before any line is produced.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<LineStream>;
}

/// Client for an Ollama-style chat endpoint.
#[derive(Debug, Clone)]
pub struct Ollama {
    client: ReqwestClient,
    endpoint: Url,
    timeout: Duration,
}

impl Ollama {
    /// Create a new client for `endpoint` with the default timeout.
    pub fn new(endpoint: Url) -> Result<Self> {
        Self::with_options(endpoint, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(endpoint: Url, timeout: Option<Duration>) -> Result<Self> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The overall per-request time bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and return default headers for requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/x-ndjson, application/json"),
        );
        headers
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process a non-success response into an `Error::Api`.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        // Ollama reports failures as {"error": "..."}; fall back to the raw body.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error")?.as_str().map(String::from))
            .unwrap_or_else(|| body.trim().to_string());
        Error::api(status_code, message)
    }

    /// Send a chat request and stream the reply.
    ///
    /// Each fragment is handed to `renderer` as it arrives; the concatenated reply is returned
    /// once the stream ends or a record marks it done.
    pub async fn chat(&self, request: &ChatRequest, renderer: &mut dyn Renderer) -> Result<String> {
        let lines = self.stream_chat(request).await?;
        consume_stream(lines, renderer).await
    }

    async fn open(&self, request: &ChatRequest) -> Result<Response> {
        let mut request = request.clone();
        request.stream = true;

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChatBackend for Ollama {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<LineStream> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = match self.open(request).await {
            Ok(response) => response,
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                tracing::warn!(endpoint = %self.endpoint, error = %err, "chat request failed");
                return Err(err);
            }
        };
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        tracing::debug!(
            endpoint = %self.endpoint,
            status = response.status().as_u16(),
            model = %request.model,
            turns = request.messages.len(),
            "streaming chat response"
        );

        let timeout = self.timeout.as_secs_f64();
        let bytes = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("Request timed out: {e}"), Some(timeout))
                } else {
                    Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
                }
            })
        });
        Ok(Box::pin(process_ndjson(bytes)))
    }
}

//! Minimal Google Gemini API client.
//!
//! This crate provides a focused client for the Generative Language API with:
//! - Non-streaming and streaming content generation
//! - System instructions and multi-turn content
//! - Proper SSE parsing for streaming responses

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Gemini API client.
#[derive(Clone)]
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl Gemini {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a Gemini client from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The model this client targets by default.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a generation request and return the full response.
    pub async fn generate(&self, request: Request) -> Result<Response, Error> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let api_request = build_api_request(&request);
        let url = format!(
            "{API_BASE}/models/{model}:generateContent?key={}",
            self.api_key
        );

        let response = self
            .client
            .post(url)
            .headers(build_headers())
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(parse_response(api_response))
    }

    /// Send a generation request and stream the response.
    ///
    /// Each item is one chunk of generated text; the final chunks carry
    /// the finish reason and token-usage metadata.
    pub async fn stream(
        &self,
        request: Request,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send>>, Error> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let api_request = build_api_request(&request);
        let url = format!(
            "{API_BASE}/models/{model}:streamGenerateContent?alt=sse&key={}",
            self.api_key
        );

        let response = self
            .client
            .post(url)
            .headers(build_headers())
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        // Use scan to maintain a buffer for incomplete SSE events across chunks
        let stream = response
            .bytes_stream()
            .scan(String::new(), |buffer, result| {
                let chunks = match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        parse_sse_chunks_buffered(buffer)
                    }
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(chunks))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

// ============================================================================
// Public types
// ============================================================================

/// A generation request to send to Gemini.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub max_output_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

impl Request {
    /// Create a new request with the given conversation contents.
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            model: None,
            system_instruction: None,
            contents,
            max_output_tokens: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// The role of a content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One entry in the conversation history.
#[derive(Debug, Clone)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// Create a user content entry with text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// Create a model content entry with text.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// All text parts concatenated.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A text part of a content entry.
#[derive(Debug, Clone)]
pub struct Part {
    pub text: String,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of generation.
    Stop,
    /// The output-token limit was hit.
    MaxTokens,
    /// The safety filter intercepted the generation.
    Safety,
    /// The recitation filter intercepted the generation.
    Recitation,
    /// Any other or unknown reason.
    Other,
}

impl FinishReason {
    fn from_api(s: &str) -> FinishReason {
        match s {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            _ => FinishReason::Other,
        }
    }

    /// True when generation was cut short rather than finishing naturally.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            FinishReason::MaxTokens | FinishReason::Safety | FinishReason::Recitation
        )
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub candidate_tokens: usize,
    pub total_tokens: usize,
}

/// A full (non-streaming) generation response.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

/// One chunk of a streaming response.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// Text generated in this chunk, if any.
    pub text: Option<String>,
    /// Present on the chunk that ends a candidate.
    pub finish_reason: Option<FinishReason>,
    /// Usage metadata; the last chunk carrying it wins.
    pub usage: Option<Usage>,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
    #[serde(default)]
    total_token_count: usize,
}

fn build_api_request(request: &Request) -> ApiRequest {
    let generation_config = if request.max_output_tokens.is_some() || request.temperature.is_some()
    {
        Some(ApiGenerationConfig {
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
        })
    } else {
        None
    };

    ApiRequest {
        system_instruction: request.system_instruction.as_ref().map(|text| ApiContent {
            role: None,
            parts: vec![ApiPart { text: text.clone() }],
        }),
        contents: request
            .contents
            .iter()
            .map(|c| ApiContent {
                role: Some(c.role.as_str().to_string()),
                parts: c
                    .parts
                    .iter()
                    .map(|p| ApiPart {
                        text: p.text.clone(),
                    })
                    .collect(),
            })
            .collect(),
        generation_config,
    }
}

fn parse_response(api: ApiResponse) -> Response {
    let usage = api.usage_metadata.map(convert_usage);

    let Some(candidate) = api.candidates.into_iter().next() else {
        return Response {
            text: String::new(),
            finish_reason: FinishReason::Other,
            usage,
        };
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(FinishReason::from_api)
        .unwrap_or(FinishReason::Other);

    Response {
        text,
        finish_reason,
        usage,
    }
}

fn convert_usage(u: ApiUsage) -> Usage {
    Usage {
        prompt_tokens: u.prompt_token_count,
        candidate_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    }
}

fn convert_chunk(api: ApiResponse) -> StreamChunk {
    let usage = api.usage_metadata.map(convert_usage);

    let Some(candidate) = api.candidates.into_iter().next() else {
        return StreamChunk {
            text: None,
            finish_reason: None,
            usage,
        };
    };

    let text = candidate.content.and_then(|c| {
        let joined = c
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    });

    StreamChunk {
        text,
        finish_reason: candidate.finish_reason.as_deref().map(FinishReason::from_api),
        usage,
    }
}

/// Parse SSE chunks from a buffer, consuming complete events and leaving incomplete data.
///
/// SSE data lines are newline-terminated; each carries one full JSON response
/// object. A line without its newline is left in the buffer for the next
/// network chunk; a terminated line that fails to parse yields an error.
fn parse_sse_chunks_buffered(buffer: &mut String) -> Vec<Result<StreamChunk, Error>> {
    let mut chunks = Vec::new();

    loop {
        let Some(newline_pos) = buffer.find('\n') else {
            // No complete line yet, wait for more data
            break;
        };

        let line = &buffer[..newline_pos];

        if let Some(json_str) = line.strip_prefix("data: ") {
            if !json_str.is_empty() && json_str != "[DONE]" {
                match serde_json::from_str::<ApiResponse>(json_str) {
                    Ok(api) => chunks.push(Ok(convert_chunk(api))),
                    // The line is newline-terminated, so truncated JSON
                    // here is malformed, not still arriving. Surface it
                    // and keep draining so the stream never stalls.
                    Err(e) => chunks.push(Err(Error::Parse(format!("SSE parse error: {e}")))),
                }
            }
        }
        // Skip event: lines, empty lines, and other SSE metadata

        buffer.drain(..=newline_pos);
    }

    chunks
}

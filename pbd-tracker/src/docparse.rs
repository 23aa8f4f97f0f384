//! Document parsing client
//!
//! Sends an uploaded roster or DSKP document to the Gemini
//! `generateContent` REST endpoint and asks for structured JSON back:
//! - student roster → flat array of names
//! - DSKP document → array of `{sk, sp}` standard pairs
//!
//! # Failure handling
//! Every request has a timeout. Network errors, timeouts, HTTP 429 and 5xx
//! are retried with exponential backoff up to `max_retries` extra attempts.
//! Other 4xx responses fail immediately. A response whose text is not the
//! requested JSON shape is a [`ParseError::Malformed`].

use base64::Engine as _;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const STUDENT_LIST_PROMPT: &str =
    "Extract a list of student names from this file. Return as a JSON array of strings.";

const DSKP_PROMPT: &str = "Extract Standard Kandungan (SK) and Standard Pembelajaran (SP) from \
     this DSKP document. Return as a JSON array of objects with 'sk' and 'sp' fields.";

/// Default delay before the first retry; doubles on each further attempt
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Document parser failures
#[derive(Debug, Error)]
pub enum ParseError {
    /// Connection-level failure
    #[error("Document parser unreachable: {0}")]
    Network(String),

    /// No answer within the configured timeout
    #[error("Document parser timed out: {0}")]
    Timeout(String),

    /// HTTP 429 from the parser
    #[error("Document parser quota exceeded: {0}")]
    Quota(String),

    /// Non-success HTTP status
    #[error("Document parser returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Response did not contain the requested JSON shape
    #[error("Document parser returned malformed output: {0}")]
    Malformed(String),
}

impl ParseError {
    fn is_retryable(&self) -> bool {
        match self {
            ParseError::Network(_) | ParseError::Timeout(_) | ParseError::Quota(_) => true,
            ParseError::Api { status, .. } => *status >= 500,
            ParseError::Malformed(_) => false,
        }
    }
}

/// Connection settings for [`DocumentParser`]
#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub api_key: String,
    pub model: String,
    /// Base URL, e.g. `https://generativelanguage.googleapis.com`
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// One curriculum standard pair extracted from a DSKP document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedStandard {
    pub sk: String,
    pub sp: String,
}

/// Client for the external document-understanding service
pub struct DocumentParser {
    http_client: Client,
    settings: ParserSettings,
    retry_delay: Duration,
}

impl DocumentParser {
    pub fn new(settings: ParserSettings) -> Result<Self, ParseError> {
        let http_client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ParseError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            settings,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Override the initial backoff delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Extract student names from a roster document
    ///
    /// Names are trimmed; blank entries are dropped.
    pub async fn extract_student_names(
        &self,
        data: &[u8],
        mime_type: &str,
    ) -> Result<Vec<String>, ParseError> {
        let schema = json!({
            "type": "ARRAY",
            "items": { "type": "STRING" }
        });

        let names: Vec<String> = self
            .generate(STUDENT_LIST_PROMPT, data, mime_type, schema)
            .await?;

        Ok(names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect())
    }

    /// Extract SK/SP pairs from a DSKP document
    ///
    /// Pairs with a blank SK or SP are dropped.
    pub async fn extract_dskp_items(
        &self,
        data: &[u8],
        mime_type: &str,
    ) -> Result<Vec<ExtractedStandard>, ParseError> {
        let schema = json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "sk": { "type": "STRING" },
                    "sp": { "type": "STRING" }
                },
                "required": ["sk", "sp"]
            }
        });

        let items: Vec<ExtractedStandard> = self
            .generate(DSKP_PROMPT, data, mime_type, schema)
            .await?;

        Ok(items
            .into_iter()
            .map(|item| ExtractedStandard {
                sk: item.sk.trim().to_string(),
                sp: item.sp.trim().to_string(),
            })
            .filter(|item| !item.sk.is_empty() && !item.sp.is_empty())
            .collect())
    }

    /// Send one document with retries and decode the JSON answer
    async fn generate<T: DeserializeOwned>(
        &self,
        prompt: &str,
        data: &[u8],
        mime_type: &str,
        schema: Value,
    ) -> Result<Vec<T>, ParseError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": mime_type,
                            "data": base64::engine::general_purpose::STANDARD.encode(data),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }
        });

        let mut attempt = 0u32;
        let text = loop {
            match self.send_once(&body).await {
                Ok(text) => break text,
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Document parser request failed, retrying: {}",
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&text)
            .map_err(|e| ParseError::Malformed(format!("{} in {:?}", e, truncate(&text, 200))))
    }

    async fn send_once(&self, body: &Value) -> Result<String, ParseError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        );

        debug!(model = %self.settings.model, "Sending document to parser");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ParseError::Timeout(e.to_string())
                } else {
                    ParseError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::Quota(truncate(&body, 500)));
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::Api {
                status,
                body: truncate(&body, 500),
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ParseError::Timeout(e.to_string())
            } else {
                ParseError::Malformed(format!("Unreadable response envelope: {}", e))
            }
        })?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .ok_or_else(|| ParseError::Malformed("Response has no candidates".to_string()))?;

        info!(chars = text.len(), "Document parser responded");
        Ok(text)
    }
}

/// Guess a MIME type from a file name when the upload did not carry one
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

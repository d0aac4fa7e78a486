//! Repair oracle backed by a messages-style chat completion API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::extract::CodeExtractor;
use super::oracle::{OracleError, RepairOracle, RepairRequest};

/// Default API endpoint
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value
const API_VERSION: &str = "2023-06-01";

/// Default model to use
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Responses longer than this are assumed to be runaway reasoning
const MAX_RESPONSE_CHARS: usize = 20_000;

/// How much of a runaway response is kept, starting at the first fence
const RUNAWAY_KEEP_CHARS: usize = 5_000;

/// Cap on the free-form context embedded in the prompt
const MAX_NOTES_CHARS: usize = 800;

const MAX_PROMPT_SAMPLES: usize = 2;
const MAX_PROMPT_KEYWORDS: usize = 3;

/// Configuration for the HTTP oracle
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts per completion, including the first
    pub max_retries: u32,
    /// Unit of the `2^attempt + 1` backoff
    pub backoff_unit: Duration,
    pub api_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4000,
            temperature: 0.3,
            timeout: Duration::from_secs(600),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            api_url: DEFAULT_API_URL.to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

impl OracleConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt).saturating_add(1)
    }
}

/// Repair oracle that asks a hosted model for a fixed program
pub struct HttpRepairOracle {
    client: Client,
    api_key: String,
    config: OracleConfig,
    extractor: CodeExtractor,
}

impl HttpRepairOracle {
    /// Create an oracle, reading the API key from `config.api_key_env`
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| OracleError::MissingApiKey {
            env_var: config.api_key_env.clone(),
        })?;
        Self::with_api_key(api_key, config)
    }

    /// Create an oracle with an explicit API key
    pub fn with_api_key(api_key: impl Into<String>, config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
            extractor: CodeExtractor::default(),
        })
    }

    /// Replace the code extractor
    pub fn with_extractor(mut self, extractor: CodeExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn build_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{ "role": "user", "content": prompt }]
        })
    }

    async fn send_once(&self, body: &Value) -> Result<String, OracleError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(OracleError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        parse_text(&body)
    }

    /// One completion, retried with exponential backoff on retryable errors
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = self.build_body(prompt);
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let mut wait = self.config.backoff(attempt);
                    if let OracleError::RateLimited { retry_after } = &e {
                        wait = wait.max(*retry_after);
                    }
                    log::warn!(
                        "Oracle call attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        attempts,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::warn!("Oracle call failed after {} attempt(s): {}", attempt + 1, e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl RepairOracle for HttpRepairOracle {
    async fn repair(&self, request: &RepairRequest) -> Result<String, OracleError> {
        let text = self.complete(&build_prompt(request)).await?;
        if let Some(code) = self.extractor.extract(&trim_runaway(&text)) {
            return Ok(code);
        }

        log::warn!(
            "No code in oracle response ({} chars, {} fence markers); sending fallback prompt",
            text.chars().count(),
            text.matches("```").count()
        );
        let retry_text = self.complete(&build_fallback_prompt(request)).await?;
        self.extractor
            .extract(&trim_runaway(&retry_text))
            .ok_or(OracleError::NoCode)
    }
}

impl std::fmt::Debug for HttpRepairOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRepairOracle")
            .field("model", &self.config.model)
            .field("api_url", &self.config.api_url)
            .finish()
    }
}

/// Concatenate the text blocks of a messages response
fn parse_text(body: &Value) -> Result<String, OracleError> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| OracleError::InvalidResponse("missing content array".to_string()))?;

    let text = blocks
        .iter()
        .filter(|b| b["type"].as_str() == Some("text"))
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(text)
}

/// Cut a runaway response down to the region starting at its first code fence
fn trim_runaway(text: &str) -> String {
    if text.chars().count() <= MAX_RESPONSE_CHARS {
        return text.to_string();
    }
    let start = ["```cpp", "```c++", "```"].iter().find_map(|fence| text.find(fence));
    match start {
        Some(start) => {
            log::debug!("Truncating {}-char oracle response at its first fence", text.chars().count());
            text[start..].chars().take(RUNAWAY_KEEP_CHARS).collect()
        }
        None => text.to_string(),
    }
}

/// Full repair prompt with problem context
pub fn build_prompt(request: &RepairRequest) -> String {
    let mut prompt = format!(
        "Fix the errors in the following C++ program. This is repair attempt {}.\n\n",
        request.attempt
    );

    let mut problem = String::new();
    if let Some(context) = &request.context {
        if let Some(description) = &context.description {
            problem.push_str(&format!("**Description:**\n{}\n\n", description.trim()));
        }
        if let Some(input_format) = &context.input_format {
            problem.push_str(&format!("**Input format:**\n{}\n\n", input_format.trim()));
        }
        if let Some(output_format) = &context.output_format {
            problem.push_str(&format!("**Output format:**\n{}\n\n", output_format.trim()));
        }
    }

    // Published samples when the caller has them, otherwise the failing ones
    let samples: Vec<(&str, &str)> = match &request.context {
        Some(context) if !context.samples.is_empty() => context
            .samples
            .iter()
            .take(MAX_PROMPT_SAMPLES)
            .map(|s| (s.input.as_str(), s.expected_output.as_str()))
            .collect(),
        _ => request
            .report
            .failures
            .iter()
            .take(MAX_PROMPT_SAMPLES)
            .map(|f| (f.input.as_str(), f.expected.as_str()))
            .collect(),
    };
    if !samples.is_empty() {
        problem.push_str("**Samples:**\n");
        for (i, (input, output)) in samples.iter().enumerate() {
            problem.push_str(&format!(
                "Sample {}:\nInput: {}\nOutput: {}\n\n",
                i + 1,
                input.trim(),
                output.trim()
            ));
        }
    }

    if let Some(context) = &request.context {
        if !context.keywords.is_empty() {
            let keywords: Vec<&str> = context
                .keywords
                .iter()
                .take(MAX_PROMPT_KEYWORDS)
                .map(String::as_str)
                .collect();
            problem.push_str(&format!("**Related algorithms:** {}\n\n", keywords.join(", ")));
        }
        if let Some(notes) = &context.notes {
            problem.push_str(&format!("**Algorithm notes:**\n{}\n\n", cap_chars(notes, MAX_NOTES_CHARS)));
        }
    }

    if !problem.is_empty() {
        prompt.push_str("## Problem\n");
        prompt.push_str(&problem);
    }

    prompt.push_str(&format!(
        "## Current code\n```cpp\n{}\n```\n\n## Errors\n{}\n\n",
        request.candidate.trim_end(),
        request.report.render()
    ));
    prompt.push_str(
        "## Requirements\n\
         1. Understand the problem from the information above\n\
         2. Make sure the fixed program handles every sample\n\
         3. Follow the input and output formats exactly\n\
         4. Respect the time and memory limits\n\
         5. Return the complete fixed program in a single ```cpp block\n",
    );
    prompt
}

/// Terse prompt used when the first response had no extractable code
pub fn build_fallback_prompt(request: &RepairRequest) -> String {
    format!(
        "Fix the errors in this C++ program. Reply with the complete fixed program only, \
         starting with ```cpp and ending with ```.\n\n\
         ```cpp\n{}\n```\n\nErrors:\n{}\n",
        request.candidate.trim_end(),
        request.report.render()
    )
}

fn cap_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(max).collect();
    capped.push_str("...");
    capped
}

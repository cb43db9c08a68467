use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlsage_core::{DatabaseKind, LlmConfig};

use crate::capability::{
    ChatMessage, LlmCapability, LlmError, SqlGeneration, SqlGenerationRequest,
};
use crate::extract;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TRANSPORT_RETRIES: u32 = 2;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// LLM provider configuration with credentials.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI chat completions API.
    OpenAi { api_key: String, model: String },
    /// Self-hosted vLLM server exposing the OpenAI-compatible endpoint.
    Vllm { api_url: String, model: String },
    /// Local Ollama instance.
    Ollama { base_url: String, model: String },
}

/// HTTP client for one provider.
///
/// Stateless: every call carries its full message list. Transient
/// failures (timeouts, 429, 5xx) are retried with backoff before the
/// error reaches the agent's own retry loop.
pub struct LlmClient {
    provider: LlmProvider,
    http: reqwest::blocking::Client,
    temperature: f64,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, temperature: f64, max_tokens: u32) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            provider,
            http,
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = match config.provider.as_str() {
            "openai" => {
                if config.api_key.is_empty() {
                    return Err(LlmError::NotConfigured(
                        "openai provider requires llm.api_key".to_string(),
                    ));
                }
                LlmProvider::OpenAi {
                    api_key: config.api_key.clone(),
                    model: if config.model.is_empty() {
                        "gpt-4o-mini".to_string()
                    } else {
                        config.model.clone()
                    },
                }
            }
            "vllm" => {
                if config.api_url.is_empty() {
                    return Err(LlmError::NotConfigured(
                        "vllm provider requires llm.api_url".to_string(),
                    ));
                }
                LlmProvider::Vllm {
                    api_url: config.api_url.clone(),
                    model: config.model.clone(),
                }
            }
            "ollama" => LlmProvider::Ollama {
                base_url: if config.api_url.is_empty() {
                    "http://localhost:11434".to_string()
                } else {
                    config.api_url.clone()
                },
                model: if config.model.is_empty() {
                    "llama3.2".to_string()
                } else {
                    config.model.clone()
                },
            },
            other => {
                return Err(LlmError::NotConfigured(format!(
                    "unknown llm provider: {}",
                    other
                )));
            }
        };

        Ok(Self::new(
            provider,
            config.temperature,
            config.max_tokens.min(u32::MAX as usize) as u32,
        ))
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAi { .. } => "openai",
            LlmProvider::Vllm { .. } => "vllm",
            LlmProvider::Ollama { .. } => "ollama",
        }
    }

    fn chat(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String, LlmError> {
        let mut delay = RETRY_BASE_DELAY_MS;
        let mut last_error = None;

        for attempt in 0..=MAX_TRANSPORT_RETRIES {
            if attempt > 0 {
                log::warn!(
                    "Retrying LLM request (attempt {}/{}), waiting {}ms",
                    attempt + 1,
                    MAX_TRANSPORT_RETRIES + 1,
                    delay
                );
                std::thread::sleep(Duration::from_millis(delay));
                delay *= 2;
            }

            match self.chat_once(messages, max_tokens) {
                Ok(content) => return Ok(content),
                Err(e) if is_transient(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Http("all retry attempts failed".to_string())))
    }

    fn chat_once(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String, LlmError> {
        match &self.provider {
            LlmProvider::OpenAi { api_key, model } => {
                let request = OpenAiRequest {
                    model,
                    messages,
                    temperature: self.temperature,
                    max_tokens,
                };

                let response = self
                    .http
                    .post("https://api.openai.com/v1/chat/completions")
                    .header("Authorization", format!("Bearer {}", api_key))
                    .json(&request)
                    .send()
                    .map_err(|e| LlmError::Http(e.to_string()))?;

                let body: OpenAiResponse = check_status(response)?;
                body.choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| LlmError::Http("empty response from OpenAI".to_string()))
            }
            LlmProvider::Vllm { api_url, model } => {
                let request = OpenAiRequest {
                    model,
                    messages,
                    temperature: self.temperature,
                    max_tokens,
                };

                let response = self
                    .http
                    .post(api_url)
                    .json(&request)
                    .send()
                    .map_err(|e| LlmError::Http(e.to_string()))?;

                let body: OpenAiResponse = check_status(response)?;
                body.choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| LlmError::Http("empty response from vLLM".to_string()))
            }
            LlmProvider::Ollama { base_url, model } => {
                let request = OllamaRequest {
                    model,
                    messages,
                    stream: false,
                    options: OllamaOptions {
                        temperature: self.temperature,
                        num_predict: max_tokens,
                    },
                };

                let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
                let response = self
                    .http
                    .post(&url)
                    .json(&request)
                    .send()
                    .map_err(|e| LlmError::Http(e.to_string()))?;

                let body: OllamaResponse = check_status(response)?;
                Ok(body.message.content)
            }
        }
    }
}

impl LlmCapability for LlmClient {
    fn generate_sql(&self, req: &SqlGenerationRequest) -> Result<SqlGeneration, LlmError> {
        let system_prompt = build_sql_system_prompt(req.database_type, &req.schema_context);

        let mut messages = Vec::with_capacity(req.history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(req.history.iter().cloned());
        messages.push(ChatMessage::user(req.question.clone()));

        let content = self.chat(&messages, self.max_tokens)?;
        log::debug!(
            "Raw {} response: {}",
            self.provider_name(),
            extract_preview(&content)
        );

        extract::extract_sql_generation(&content)
    }

    fn generate_structured(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<serde_json::Value, LlmError> {
        let content = self.chat(messages, max_tokens)?;

        extract::extract_json(&content).ok_or_else(|| LlmError::InvalidJson {
            preview: extract_preview(&content),
        })
    }
}

/// Dialect-aware system prompt demanding the exact JSON reply shape.
fn build_sql_system_prompt(kind: DatabaseKind, schema_context: &str) -> String {
    let db_name = kind.display_name();

    format!(
        "You are a {db_name} SQL query generator. Your job is to convert natural language \
         questions into valid {db_name} queries.\n\n\
         Database Schema:\n{schema_context}\n\n\
         {rules}\n\n\
         CRITICAL INSTRUCTIONS:\n\
         1. Generate ONLY valid {db_name} SQL queries\n\
         2. Return the response in this EXACT JSON format: \
         {{\"sql\": \"YOUR_SQL_HERE\", \"explanation\": \"brief explanation\"}}\n\
         3. The \"sql\" field must contain ONLY executable SQL, no explanatory text\n\
         4. Use ONLY tables and columns from the schema above\n\
         5. Add appropriate row limiting for broad SELECT queries\n\n\
         EXAMPLE RESPONSES:\n\
         Question: \"How many users are there?\"\n\
         Response: {{\"sql\": \"SELECT COUNT(*) FROM users;\", \"explanation\": \"Counts all users\"}}\n\
         Question: \"Show all products\"\n\
         Response: {{\"sql\": \"SELECT * FROM products {limit};\", \"explanation\": \"Lists products\"}}",
        db_name = db_name,
        schema_context = schema_context,
        rules = kind.rule_sheet(),
        limit = kind.row_limit_clause(100),
    )
}

fn check_status<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            body: extract_preview(&body),
        });
    }

    response.json().map_err(|e| LlmError::Http(e.to_string()))
}

fn is_transient(error: &LlmError) -> bool {
    match error {
        LlmError::Http(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("timeout") || msg.contains("timed out") || msg.contains("connection")
        }
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn extract_preview(content: &str) -> String {
    sqlsage_core::truncate_string_safe(content.trim(), 200)
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

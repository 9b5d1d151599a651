//! External answer-evaluation seam.
//!
//! The engine treats evaluation as a black box behind `AnswerEvaluator`; the
//! production implementation calls an OpenAI-compatible chat endpoint and
//! asks for a structured verdict. Tests inject scripted evaluators.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::engine::types::Evaluation;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluator not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        exercise_id: &str,
        user_answer: &str,
        language: &str,
    ) -> Result<Evaluation, EvaluatorError>;
}

#[derive(Debug, Clone)]
pub struct LlmEvaluatorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

/// Chat-completion-backed evaluator.
#[derive(Clone)]
pub struct LlmEvaluator {
    config: LlmEvaluatorConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    score: f64,
    feedback: String,
    correct: bool,
}

impl LlmEvaluator {
    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY");
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = env_string("LLM_API_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout = Duration::from_millis(
            env_string("LLM_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config: LlmEvaluatorConfig {
                api_key,
                model,
                api_endpoint,
                timeout,
            },
            client,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }

    async fn request_verdict(
        &self,
        exercise_id: &str,
        user_answer: &str,
        language: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|v| !v.trim().is_empty())
        else {
            return Err(EvaluatorError::NotConfigured("LLM_API_KEY"));
        };

        let url = format!("{}/chat/completions", self.config.api_endpoint);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "You grade student answers. Respond in {language} with a single JSON \
                         object: {{\"score\": number in [0,1], \"feedback\": string, \
                         \"correct\": boolean}}."
                    ),
                },
                {
                    "role": "user",
                    "content": format!(
                        "Exercise id: {exercise_id}\nStudent answer:\n{user_answer}"
                    ),
                }
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvaluatorError::HttpStatus { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(EvaluatorError::EmptyChoices)?;

        let verdict: Verdict = serde_json::from_str(extract_json(content))?;
        Ok(Evaluation {
            score: verdict.score.clamp(0.0, 1.0),
            feedback: verdict.feedback,
            correct: verdict.correct,
        })
    }
}

#[async_trait]
impl AnswerEvaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        exercise_id: &str,
        user_answer: &str,
        language: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.request_verdict(exercise_id, user_answer, language).await {
                Ok(verdict) => return Ok(verdict),
                Err(err @ EvaluatorError::NotConfigured(_)) => return Err(err),
                Err(err) => {
                    warn!(
                        exercise_id = %exercise_id,
                        attempt = attempt + 1,
                        error = %err,
                        "answer evaluation attempt failed"
                    );
                    last_err = Some(err);
                    sleep(Duration::from_millis(BASE_BACKOFF_MS << attempt)).await;
                }
            }
        }
        Err(last_err.unwrap_or(EvaluatorError::EmptyChoices))
    }
}

/// Models wrap JSON in prose or fences often enough that we cut to the
/// outermost braces before parsing.
fn extract_json(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

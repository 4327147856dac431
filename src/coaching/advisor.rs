//! Core `CoachingAdvisor` trait and the chat-completions backed `ApiAdvisor`.
//!
//! `ApiAdvisor` talks to any OpenAI-compatible `/v1/chat/completions`
//! endpoint (OpenAI, Groq, Ollama in OpenAI mode, LM Studio, vLLM).  The
//! connection details come from [`AdvisorConfig`].

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::analysis::{TargetPitch, VocalMetrics};
use crate::coaching::prompt::CoachingPrompt;
use crate::config::AdvisorConfig;

// ---------------------------------------------------------------------------
// AdvisorError
// ---------------------------------------------------------------------------

/// Errors that can occur while asking an advisor for tips.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("advisor request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse advisor response: {0}")]
    Parse(String),

    /// The reply contained neither feedback nor tips.
    #[error("advisor returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for AdvisorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AdvisorError::Timeout
        } else {
            AdvisorError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

/// What the sampler hands to an advisor for one accepted sample.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachingRequest {
    /// The sample that passed the throttle.
    pub metrics: VocalMetrics,
    /// Previously accepted samples, oldest first (the current one excluded).
    pub history: Vec<VocalMetrics>,
    /// The note the singer is aiming for, if any.
    pub target: Option<TargetPitch>,
}

impl CoachingRequest {
    pub fn new(metrics: VocalMetrics) -> Self {
        Self {
            metrics,
            history: Vec::new(),
            target: None,
        }
    }
}

/// An advisor's reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Advice {
    /// One-sentence overall impression.
    #[serde(default)]
    pub feedback: String,
    /// Short actionable tips, most important first.
    #[serde(default)]
    pub tips: Vec<String>,
}

impl Advice {
    pub fn is_empty(&self) -> bool {
        self.feedback.trim().is_empty() && self.tips.iter().all(|t| t.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// CoachingAdvisor trait
// ---------------------------------------------------------------------------

/// Async trait implemented by every tip backend.
///
/// Implementors must be `Send + Sync` so one advisor can be shared by the
/// coaching worker as `Arc<dyn CoachingAdvisor>`.
#[async_trait]
pub trait CoachingAdvisor: Send + Sync {
    async fn produce_tips(&self, request: &CoachingRequest) -> Result<Advice, AdvisorError>;
}

// ---------------------------------------------------------------------------
// ApiAdvisor
// ---------------------------------------------------------------------------

/// Asks an OpenAI-compatible chat-completions endpoint for coaching tips.
///
/// The model is told to answer with `{"feedback": "...", "tips": [...]}`.
/// Models that ignore the format and answer in prose are handled by
/// [`parse_advice`], which falls back to one tip per bullet line.
pub struct ApiAdvisor {
    client: reqwest::Client,
    config: AdvisorConfig,
    prompt: CoachingPrompt,
}

impl ApiAdvisor {
    /// Build an `ApiAdvisor` with the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &AdvisorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            prompt: CoachingPrompt::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CoachingAdvisor for ApiAdvisor {
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is a non-empty string, so local servers work unchanged.
    async fn produce_tips(&self, request: &CoachingRequest) -> Result<Advice, AdvisorError> {
        let (system_msg, user_msg) = self.prompt.build_chat(request);

        let body = serde_json::json!({
            "model":       self.config.model,
            "messages": [
                { "role": "system", "content": system_msg },
                { "role": "user",   "content": user_msg   }
            ],
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  200
        });

        let mut req = self.client.post(self.endpoint()).json(&body);

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?.error_for_status()?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::Parse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(AdvisorError::EmptyResponse)?;

        parse_advice(content)
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Turn a model reply into [`Advice`].
///
/// Accepts the requested JSON object, optionally wrapped in a Markdown code
/// fence.  Anything else is read line by line: bullet or numbered lines become
/// tips and the first plain line becomes the feedback.
pub fn parse_advice(content: &str) -> Result<Advice, AdvisorError> {
    let trimmed = strip_code_fence(content.trim());
    if trimmed.is_empty() {
        return Err(AdvisorError::EmptyResponse);
    }

    let advice = if trimmed.starts_with('{') {
        serde_json::from_str::<Advice>(trimmed).map_err(|e| AdvisorError::Parse(e.to_string()))?
    } else {
        parse_lines(trimmed)
    };

    let advice = Advice {
        feedback: advice.feedback.trim().to_string(),
        tips: advice
            .tips
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    };

    if advice.is_empty() {
        return Err(AdvisorError::EmptyResponse);
    }
    Ok(advice)
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the info string (`json`) on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_lines(text: &str) -> Advice {
    let mut advice = Advice::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match strip_bullet(line) {
            Some(tip) => advice.tips.push(tip.to_string()),
            None if advice.feedback.is_empty() => advice.feedback = line.to_string(),
            None => {}
        }
    }
    advice
}

fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    // "1. tip" / "2) tip"
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(tip) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(tip);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorProvider;

    fn make_config(api_key: Option<&str>) -> AdvisorConfig {
        AdvisorConfig {
            provider: AdvisorProvider::OpenAiCompatible,
            base_url: "http://localhost:11434/".into(),
            api_key: api_key.map(|s| s.to_string()),
            model: "qwen2.5:3b".into(),
            temperature: 0.5,
            timeout_secs: 5,
        }
    }

    // ---- construction ----

    #[test]
    fn from_config_accepts_missing_and_empty_keys() {
        let _ = ApiAdvisor::from_config(&make_config(None));
        let _ = ApiAdvisor::from_config(&make_config(Some("")));
        let _ = ApiAdvisor::from_config(&make_config(Some("sk-test-1234")));
    }

    #[test]
    fn endpoint_does_not_double_the_slash() {
        let advisor = ApiAdvisor::from_config(&make_config(None));
        assert_eq!(advisor.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn advisor_is_object_safe() {
        let advisor: Box<dyn CoachingAdvisor> =
            Box::new(ApiAdvisor::from_config(&make_config(None)));
        drop(advisor);
    }

    // ---- parse_advice ----

    #[test]
    fn parses_json_reply() {
        let advice = parse_advice(
            r#"{"feedback": "Nice control.", "tips": ["Breathe from the diaphragm", " ", "Relax the jaw"]}"#,
        )
        .unwrap();
        assert_eq!(advice.feedback, "Nice control.");
        assert_eq!(advice.tips, vec!["Breathe from the diaphragm", "Relax the jaw"]);
    }

    #[test]
    fn parses_fenced_json_reply() {
        let reply = "```json\n{\"feedback\": \"Good\", \"tips\": [\"Open your mouth wider\"]}\n```";
        let advice = parse_advice(reply).unwrap();
        assert_eq!(advice.feedback, "Good");
        assert_eq!(advice.tips, vec!["Open your mouth wider"]);
    }

    #[test]
    fn json_with_missing_fields_is_accepted() {
        let advice = parse_advice(r#"{"tips": ["Sing louder"]}"#).unwrap();
        assert_eq!(advice.feedback, "");
        assert_eq!(advice.tips, vec!["Sing louder"]);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_advice("{\"tips\": [1, 2"), Err(AdvisorError::Parse(_))));
    }

    #[test]
    fn prose_reply_falls_back_to_bullet_lines() {
        let reply = "You're doing well overall.\n\n- Support the breath\n* Keep the vowel open\n2) Slide into the note\nAnother remark";
        let advice = parse_advice(reply).unwrap();
        assert_eq!(advice.feedback, "You're doing well overall.");
        assert_eq!(
            advice.tips,
            vec!["Support the breath", "Keep the vowel open", "Slide into the note"]
        );
    }

    #[test]
    fn blank_or_empty_replies_are_rejected() {
        assert!(matches!(parse_advice("   "), Err(AdvisorError::EmptyResponse)));
        assert!(matches!(
            parse_advice(r#"{"feedback": "", "tips": []}"#),
            Err(AdvisorError::EmptyResponse)
        ));
    }
}

//! Classification provider abstraction and implementations.
//!
//! Defines the [`Classifier`] trait and concrete implementations:
//! - **[`DisabledClassifier`]** — always unavailable; the pipeline's
//!   fail-safe turns that into "not an emergency".
//! - **[`OpenAiClassifier`]** — asks a chat-completions model for a strict
//!   JSON judgment of the message.
//!
//! The classifier sits in the critical path of an emergency response, so
//! requests carry a single-digit-second budget and are never retried; a
//! slow judgment is worth less than a fast degraded answer.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::models::{ClassificationJudgment, ServiceKind, Severity};

/// Trait for emergency classification providers.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Provider name for logs and the `check` command.
    fn name(&self) -> &str;

    /// Judge one message, optionally with prior conversation turns for
    /// context.
    async fn classify(
        &self,
        message: &str,
        context: &[String],
    ) -> Result<ClassificationJudgment, ClassifierError>;
}

/// Create the appropriate [`Classifier`] based on configuration.
pub fn create_classifier(config: &ClassifierConfig) -> anyhow::Result<Arc<dyn Classifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClassifier)),
        "openai" => Ok(Arc::new(OpenAiClassifier::new(config)?)),
        other => anyhow::bail!("Unknown classifier provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op classifier that always reports itself unavailable.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn classify(
        &self,
        _message: &str,
        _context: &[String],
    ) -> Result<ClassificationJudgment, ClassifierError> {
        Err(ClassifierError::Unavailable(
            "classifier provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are the emergency triage component of an \
assistant for Sri Lanka. Judge whether the user's message describes a real, \
current emergency that warrants calling police (119), fire & rescue (110), \
or an ambulance (1990). Questions about services, first-aid advice for minor \
injuries, and hypotheticals are NOT emergencies. Respond with strict JSON \
only: {\"is_emergency\": bool, \"severity\": \"none\"|\"minor\"|\"moderate\"|\
\"severe\", \"types\": [\"police\"|\"fire\"|\"ambulance\", ...], \
\"confidence\": number in [0,1], \"reasoning\": string}. A message may imply \
several types at once.";

/// Classifier backed by the OpenAI chat-completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiClassifier {
    model: String,
    client: reqwest::Client,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig) -> anyhow::Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            anyhow::bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify(
        &self,
        message: &str,
        context: &[String],
    ) -> Result<ClassificationJudgment, ClassifierError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClassifierError::Unavailable("OPENAI_API_KEY not set".to_string()))?;

        let user_content = if context.is_empty() {
            message.to_string()
        } else {
            format!(
                "Conversation so far:\n{}\n\nLatest message: {}",
                context.join("\n"),
                message
            )
        };

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_content},
            ],
        });

        let resp = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Unavailable(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                ClassifierError::Malformed("missing choices[0].message.content".to_string())
            })?;

        parse_judgment(content)
    }
}

/// Raw judgment as the model is prompted to emit it.
#[derive(Deserialize)]
struct RawJudgment {
    is_emergency: bool,
    severity: Severity,
    #[serde(default)]
    types: Vec<ServiceKind>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse the model's JSON reply into a [`ClassificationJudgment`].
///
/// Tolerates markdown code fences around the JSON (models add them despite
/// instructions). Enforces the judgment invariants: the service set is
/// cleared unless `is_emergency` holds, duplicates are dropped, and
/// confidence is clamped into `[0, 1]`.
pub fn parse_judgment(content: &str) -> Result<ClassificationJudgment, ClassifierError> {
    let stripped = strip_code_fence(content);

    let raw: RawJudgment = serde_json::from_str(stripped)
        .map_err(|e| ClassifierError::Malformed(format!("{}: {}", e, stripped)))?;

    let mut services: Vec<ServiceKind> = Vec::new();
    if raw.is_emergency {
        for s in raw.types {
            if !services.contains(&s) {
                services.push(s);
            }
        }
    }

    Ok(ClassificationJudgment {
        is_emergency: raw.is_emergency,
        severity: raw.severity,
        services,
        confidence: raw.confidence.clamp(0.0, 1.0),
        reasoning: raw.reasoning,
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_judgment() {
        let j = parse_judgment(
            r#"{"is_emergency": true, "severity": "severe", "types": ["fire", "ambulance"], "confidence": 0.91, "reasoning": "house fire with injuries"}"#,
        )
        .unwrap();
        assert!(j.is_emergency);
        assert_eq!(j.severity, Severity::Severe);
        assert_eq!(j.services, vec![ServiceKind::Fire, ServiceKind::Ambulance]);
        assert!((j.confidence - 0.91).abs() < 1e-9);
    }

    #[test]
    fn parses_fenced_judgment() {
        let j = parse_judgment(
            "```json\n{\"is_emergency\": false, \"severity\": \"minor\", \"types\": [], \"confidence\": 0.8, \"reasoning\": \"small cut\"}\n```",
        )
        .unwrap();
        assert!(!j.is_emergency);
        assert_eq!(j.severity, Severity::Minor);
    }

    #[test]
    fn non_emergency_clears_services() {
        let j = parse_judgment(
            r#"{"is_emergency": false, "severity": "none", "types": ["police"], "confidence": 0.4, "reasoning": ""}"#,
        )
        .unwrap();
        assert!(j.services.is_empty());
    }

    #[test]
    fn duplicate_services_dropped() {
        let j = parse_judgment(
            r#"{"is_emergency": true, "severity": "severe", "types": ["police", "police"], "confidence": 0.9, "reasoning": ""}"#,
        )
        .unwrap();
        assert_eq!(j.services, vec![ServiceKind::Police]);
    }

    #[test]
    fn confidence_clamped() {
        let j = parse_judgment(
            r#"{"is_emergency": true, "severity": "severe", "types": ["fire"], "confidence": 1.7, "reasoning": ""}"#,
        )
        .unwrap();
        assert_eq!(j.confidence, 1.0);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_judgment("the building is on fire, call someone"),
            Err(ClassifierError::Malformed(_))
        ));
    }
}

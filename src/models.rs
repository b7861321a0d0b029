//! Core data types flowing through the classification and dispatch pipeline.
//!
//! These types carry a user message from triage through classification,
//! decision, dispatch, and into the call registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emergency service a call can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Police,
    Fire,
    Ambulance,
}

impl ServiceKind {
    /// All services, in display order.
    pub const ALL: [ServiceKind; 3] = [
        ServiceKind::Police,
        ServiceKind::Fire,
        ServiceKind::Ambulance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Police => "police",
            ServiceKind::Fire => "fire",
            ServiceKind::Ambulance => "ambulance",
        }
    }

    /// Dispatch-order priority when one message implies several services.
    /// Lower is more urgent: medical risk to life is weighted highest.
    pub fn priority(&self) -> u8 {
        match self {
            ServiceKind::Ambulance => 0,
            ServiceKind::Fire => 1,
            ServiceKind::Police => 2,
        }
    }
}

/// Language of a user message (English, Sinhala, or Tamil).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Si,
    Ta,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Si => "si",
            Language::Ta => "ta",
        }
    }

    /// Detect the dominant script of `text`.
    ///
    /// Counts Sinhala (U+0D80–U+0DFF), Tamil (U+0B80–U+0BFF), and ASCII
    /// alphabetic characters. A non-Latin script wins once it outweighs
    /// 30% of the Latin count, so short English fragments ("ok", numbers)
    /// inside a Sinhala or Tamil message do not flip the result.
    pub fn detect(text: &str) -> Language {
        let mut sinhala = 0usize;
        let mut tamil = 0usize;
        let mut english = 0usize;

        for c in text.chars() {
            if ('\u{0D80}'..='\u{0DFF}').contains(&c) {
                sinhala += 1;
            } else if ('\u{0B80}'..='\u{0BFF}').contains(&c) {
                tamil += 1;
            } else if c.is_ascii_alphabetic() {
                english += 1;
            }
        }

        if sinhala + tamil + english == 0 {
            return Language::En;
        }

        let latin_weight = english as f64 * 0.3;
        if sinhala > tamil && sinhala as f64 > latin_weight {
            Language::Si
        } else if tamil as f64 > latin_weight {
            Language::Ta
        } else {
            Language::En
        }
    }
}

/// Classifier-assessed severity of the described situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Minor,
    Moderate,
    Severe,
}

/// Lifecycle status of an outbound call.
///
/// `Completed`, `Failed`, and `Canceled` are terminal: the registry rejects
/// any transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::Canceled => "canceled",
        }
    }

    /// Map a telephony-provider status string onto our lifecycle.
    ///
    /// `busy` and `no-answer` are provider-side terminal failures and fold
    /// into [`CallStatus::Failed`]. Unknown strings return `None` and the
    /// caller decides whether to ignore or log them.
    pub fn from_provider(s: &str) -> Option<CallStatus> {
        match s {
            "initiated" => Some(CallStatus::Initiated),
            "queued" => Some(CallStatus::Queued),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" | "busy" | "no-answer" => Some(CallStatus::Failed),
            "canceled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed judgment produced by the external classifier for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationJudgment {
    pub is_emergency: bool,
    pub severity: Severity,
    /// Services the classifier believes are implied. Non-empty only when
    /// `is_emergency` holds; the adapter enforces this invariant on parse.
    pub services: Vec<ServiceKind>,
    /// Shared confidence in `[0, 1]` for the whole judgment.
    pub confidence: f64,
    /// Free-text rationale, kept for audit logs only.
    pub reasoning: String,
}

impl ClassificationJudgment {
    /// The fail-safe judgment used when the classifier is unreachable:
    /// never auto-escalate on classifier failure.
    pub fn non_emergency(reasoning: impl Into<String>) -> Self {
        ClassificationJudgment {
            is_emergency: false,
            severity: Severity::None,
            services: Vec::new(),
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// A decided need to call one specific emergency service.
///
/// Produced by the decision engine and consumed immediately by the
/// dispatcher; never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmergencyIntent {
    pub service: ServiceKind,
    /// Tie-break ordering when one message yields several intents
    /// (lower = more urgent). Affects reporting order only; dispatch is
    /// always concurrent.
    pub priority: u8,
    pub confidence: f64,
    pub language: Language,
}

/// Mutable record of one outbound call.
///
/// Owned exclusively by the [`crate::registry::CallRegistry`] from creation
/// until a terminal status; everything handed to clients is a clone.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    /// Provider-assigned call identifier (Twilio call SID).
    pub call_id: String,
    pub service: ServiceKind,
    pub status: CallStatus,
    pub language: Language,
    pub started_at: DateTime<Utc>,
    /// Seconds the call lasted, filled in once the provider reports it.
    pub duration_seconds: Option<u32>,
    /// Public URL of the synthesized user message, or `None` when the
    /// provider-native speech fallback was used.
    pub audio_ref: Option<String>,
    /// Groups calls placed for the same user session.
    pub session_id: String,
}

/// Outcome of dispatching a single intent.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// The provider accepted the call and assigned it an id.
    Placed {
        call_id: String,
        audio_ref: Option<String>,
    },
    /// The call could not be placed; the reason is reported, not thrown.
    Failed { reason: String },
}

/// One intent paired with what happened to it.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub intent: EmergencyIntent,
    pub outcome: DispatchOutcome,
}

/// Everything that came out of dispatching one message's intents.
///
/// `results` is index-aligned with the input intent sequence: every intent
/// yields exactly one entry, success or failure, never silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchBatch {
    /// Correlates this batch's log lines and results (UUID v4).
    pub batch_id: String,
    pub session_id: String,
    pub results: Vec<DispatchResult>,
}

impl DispatchBatch {
    pub fn placed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, DispatchOutcome::Placed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.placed()
    }

    /// True when every intent failed to dispatch — the one case that must
    /// be loudly surfaced to the user.
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.placed() == 0
    }
}

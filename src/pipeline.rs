//! The message pipeline: everything that happens to one inbound chat
//! message.
//!
//! Layering follows the hybrid architecture: a free pre-filter first, the
//! external classifier only when needed, then the pure decision gate, and
//! finally concurrent dispatch. Classifier failures are absorbed into a
//! degraded non-emergency outcome — the one failure that is loudly
//! surfaced is a batch where every call failed to dispatch, because silent
//! failure there has life-safety consequences.

use serde::Serialize;
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::decision::decide;
use crate::dispatch::Dispatcher;
use crate::models::{
    ClassificationJudgment, DispatchBatch, DispatchOutcome, Language, ServiceKind,
};
use crate::monitor;
use crate::registry::CallRegistry;
use crate::telephony::TelephonyProvider;
use crate::triage::{triage, SmalltalkKind, Triage};

/// What the chat transport should do with a processed message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatOutcome {
    /// Answered instantly by the pre-filter; no classifier involved.
    Fast { reply: String, language: Language },
    /// Not an emergency: hand the message to the conversational path.
    /// `degraded` marks judgments forced by a classifier failure.
    Conversation {
        language: Language,
        degraded: bool,
        judgment: ClassificationJudgment,
    },
    /// One or more emergency calls were dispatched (or attempted).
    Emergency {
        language: Language,
        judgment: ClassificationJudgment,
        batch: DispatchBatch,
        reply: String,
    },
}

/// Owns the full message path from raw text to chat outcome.
pub struct Pipeline {
    config: Arc<Config>,
    classifier: Arc<dyn Classifier>,
    telephony: Arc<dyn TelephonyProvider>,
    registry: Arc<CallRegistry>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        classifier: Arc<dyn Classifier>,
        synthesizer: Arc<dyn crate::audio::SpeechSynthesizer>,
        telephony: Arc<dyn TelephonyProvider>,
        registry: Arc<CallRegistry>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            config.clone(),
            synthesizer,
            telephony.clone(),
            registry.clone(),
        );
        Self {
            config,
            classifier,
            telephony,
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    pub fn telephony(&self) -> &Arc<dyn TelephonyProvider> {
        &self.telephony
    }

    /// Run one message through triage, classification, decision, and — when
    /// the decision engine yields intents — concurrent dispatch.
    pub async fn handle_message(
        &self,
        message: &str,
        session_id: &str,
        context: &[String],
    ) -> ChatOutcome {
        let language = Language::detect(message);

        match triage(message) {
            Triage::Smalltalk(kind) => {
                return ChatOutcome::Fast {
                    reply: self.smalltalk_reply(kind),
                    language,
                };
            }
            Triage::OffTopic => {
                return ChatOutcome::Fast {
                    reply: self.redirect_reply(),
                    language,
                };
            }
            Triage::Escalate => {}
        }

        let (judgment, degraded) = match self.classifier.classify(message, context).await {
            Ok(judgment) => {
                tracing::info!(
                    session = session_id,
                    is_emergency = judgment.is_emergency,
                    severity = ?judgment.severity,
                    confidence = judgment.confidence,
                    reasoning = %judgment.reasoning,
                    "classification judgment"
                );
                (judgment, false)
            }
            Err(e) => {
                // Fail-safe: never auto-escalate on classifier failure.
                tracing::warn!(
                    session = session_id,
                    error = %e,
                    "classifier failed; treating message as non-emergency"
                );
                (
                    ClassificationJudgment::non_emergency(format!("classifier degraded: {}", e)),
                    true,
                )
            }
        };

        let intents = decide(&judgment, language);
        if intents.is_empty() {
            return ChatOutcome::Conversation {
                language,
                degraded,
                judgment,
            };
        }

        tracing::info!(
            session = session_id,
            count = intents.len(),
            services = ?intents.iter().map(|i| i.service.as_str()).collect::<Vec<_>>(),
            "emergency detected; dispatching"
        );

        let batch = self.dispatcher.dispatch(session_id, message, &intents).await;

        // Every placed call gets a poller so its record cannot dangle in a
        // non-terminal state if provider callbacks never arrive.
        for result in &batch.results {
            if let DispatchOutcome::Placed { call_id, .. } = &result.outcome {
                monitor::spawn(
                    self.telephony.clone(),
                    self.registry.clone(),
                    &self.config.telephony,
                    call_id.clone(),
                );
            }
        }

        let reply = self.emergency_reply(&batch);
        ChatOutcome::Emergency {
            language,
            judgment,
            batch,
            reply,
        }
    }

    fn numbers_footer(&self) -> String {
        format!(
            "Police: {}\nFire & Rescue: {}\nAmbulance: {}",
            self.config.telephony.number_for(ServiceKind::Police),
            self.config.telephony.number_for(ServiceKind::Fire),
            self.config.telephony.number_for(ServiceKind::Ambulance),
        )
    }

    fn smalltalk_reply(&self, kind: SmalltalkKind) -> String {
        match kind {
            SmalltalkKind::Greeting => format!(
                "Hello! I'm CrimeGuard, your emergency assistant. Describe an \
                 emergency and I can call the right service for you.\n\n{}",
                self.numbers_footer()
            ),
            SmalltalkKind::Farewell => format!(
                "Stay safe! I'm here around the clock if you need me.\n\n{}",
                self.numbers_footer()
            ),
            SmalltalkKind::Thanks => format!(
                "You're welcome. Reach out any time you need emergency help.\n\n{}",
                self.numbers_footer()
            ),
        }
    }

    fn redirect_reply(&self) -> String {
        format!(
            "I'm specialized in emergency assistance only. Describe an \
             emergency and I can call the right service for you.\n\n{}",
            self.numbers_footer()
        )
    }

    fn emergency_reply(&self, batch: &DispatchBatch) -> String {
        if batch.all_failed() {
            // Life-safety: total dispatch failure is the one loud case.
            return format!(
                "EMERGENCY CALLING FAILED. I could not place any call on your \
                 behalf. Please dial the service directly now:\n{}",
                self.numbers_footer()
            );
        }

        let mut lines = vec![format!(
            "{} emergency service(s) contacted on your behalf:",
            batch.placed()
        )];
        for result in &batch.results {
            match &result.outcome {
                DispatchOutcome::Placed { call_id, .. } => {
                    lines.push(format!(
                        "- {}: call placed ({})",
                        result.intent.service.as_str(),
                        call_id
                    ));
                }
                DispatchOutcome::Failed { reason } => {
                    lines.push(format!(
                        "- {}: call FAILED ({}). Please dial {} directly.",
                        result.intent.service.as_str(),
                        reason,
                        self.config.telephony.number_for(result.intent.service)
                    ));
                }
            }
        }
        lines.join("\n")
    }
}

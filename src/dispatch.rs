//! Concurrent dispatch of one batch of emergency intents.
//!
//! Every intent in a batch is dispatched in parallel — latency to emergency
//! services must not accumulate with intent count — and the batch joins on
//! all branches before returning. Each branch is independent: audio
//! resolution, TwiML, call placement, and registry insertion for one intent
//! never block or roll back the others. The result vector is index-aligned
//! with the input intents; a branch that fails (or panics) still yields its
//! slot as a reported failure, never a hole.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::audio::{resolve_audio, SpeechSynthesizer};
use crate::config::Config;
use crate::models::{
    CallRecord, CallStatus, DispatchBatch, DispatchOutcome, DispatchResult, EmergencyIntent,
};
use crate::registry::CallRegistry;
use crate::telephony::{build_twiml, TelephonyProvider};

pub struct Dispatcher {
    config: Arc<Config>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    telephony: Arc<dyn TelephonyProvider>,
    registry: Arc<CallRegistry>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        telephony: Arc<dyn TelephonyProvider>,
        registry: Arc<CallRegistry>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            telephony,
            registry,
        }
    }

    /// Place one call per intent, concurrently, and join on all of them.
    ///
    /// Successful branches insert their [`CallRecord`] into the registry
    /// before this returns, so the caller can immediately poll or cancel
    /// any reported call id.
    pub async fn dispatch(
        &self,
        session_id: &str,
        message: &str,
        intents: &[EmergencyIntent],
    ) -> DispatchBatch {
        let batch_id = Uuid::new_v4().to_string();
        tracing::info!(
            batch_id = %batch_id,
            session = session_id,
            count = intents.len(),
            "dispatching batch"
        );

        let mut set: JoinSet<(usize, DispatchOutcome)> = JoinSet::new();

        for (index, intent) in intents.iter().copied().enumerate() {
            let config = self.config.clone();
            let synthesizer = self.synthesizer.clone();
            let telephony = self.telephony.clone();
            let registry = self.registry.clone();
            let message = message.to_string();
            let session_id = session_id.to_string();

            set.spawn(async move {
                let outcome = dispatch_one(
                    &config,
                    synthesizer.as_ref(),
                    telephony.as_ref(),
                    &registry,
                    &session_id,
                    &message,
                    intent,
                )
                .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<DispatchOutcome>> = vec![None; intents.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => {
                    // A panicked branch loses its index; the sweep below
                    // turns the empty slot into a reported failure.
                    tracing::error!(error = %e, "dispatch branch aborted");
                }
            }
        }

        let results = intents
            .iter()
            .copied()
            .zip(slots)
            .map(|(intent, slot)| DispatchResult {
                intent,
                outcome: slot.unwrap_or_else(|| DispatchOutcome::Failed {
                    reason: "dispatch branch aborted".to_string(),
                }),
            })
            .collect();

        DispatchBatch {
            batch_id,
            session_id: session_id.to_string(),
            results,
        }
    }
}

async fn dispatch_one(
    config: &Config,
    synthesizer: &dyn SpeechSynthesizer,
    telephony: &dyn TelephonyProvider,
    registry: &CallRegistry,
    session_id: &str,
    message: &str,
    intent: EmergencyIntent,
) -> DispatchOutcome {
    // Audio failures degrade to provider-native speech; they never block
    // the call.
    let audio_ref = resolve_audio(
        &config.server,
        &config.speech,
        synthesizer,
        message,
        intent.language,
    )
    .await;

    let twiml = match build_twiml(intent.service, message, audio_ref.as_deref()) {
        Ok(twiml) => twiml,
        Err(e) => {
            return DispatchOutcome::Failed {
                reason: e.to_string(),
            }
        }
    };

    let to = config.telephony.number_for(intent.service);
    match telephony.place_call(to, &twiml).await {
        Ok(call_id) => {
            registry.create(CallRecord {
                call_id: call_id.clone(),
                service: intent.service,
                status: CallStatus::Initiated,
                language: intent.language,
                started_at: Utc::now(),
                duration_seconds: None,
                audio_ref: audio_ref.clone(),
                session_id: session_id.to_string(),
            });
            tracing::info!(
                call_id = %call_id,
                service = intent.service.as_str(),
                to,
                "emergency call initiated"
            );
            DispatchOutcome::Placed { call_id, audio_ref }
        }
        Err(e) => {
            tracing::error!(
                service = intent.service.as_str(),
                to,
                error = %e,
                "emergency call failed to dispatch"
            );
            DispatchOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DisabledSynthesizer;
    use crate::telephony::DisabledProvider;

    #[tokio::test]
    async fn empty_intent_list_yields_empty_batch() {
        let dispatcher = Dispatcher::new(
            Arc::new(crate::config::Config {
                server: Default::default(),
                classifier: Default::default(),
                speech: Default::default(),
                telephony: Default::default(),
            }),
            Arc::new(DisabledSynthesizer),
            Arc::new(DisabledProvider),
            Arc::new(CallRegistry::new()),
        );

        let batch = dispatcher.dispatch("s1", "nothing", &[]).await;
        assert!(batch.results.is_empty());
        assert!(!batch.all_failed());
    }
}

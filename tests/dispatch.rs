//! Batch dispatch laws, exercised against mock providers.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crimeguard::audio::SpeechSynthesizer;
use crimeguard::config::Config;
use crimeguard::decision::decide;
use crimeguard::dispatch::Dispatcher;
use crimeguard::error::{AudioError, TelephonyError};
use crimeguard::models::{
    CallStatus, ClassificationJudgment, DispatchOutcome, Language, ServiceKind, Severity,
};
use crimeguard::registry::CallRegistry;
use crimeguard::telephony::TelephonyProvider;

/// Telephony mock: every call takes `delay`, calls to numbers in
/// `fail_numbers` are refused.
struct MockTelephony {
    delay: Duration,
    fail_numbers: HashSet<String>,
    placed: AtomicUsize,
}

impl MockTelephony {
    fn new(delay: Duration, fail_numbers: &[&str]) -> Self {
        Self {
            delay,
            fail_numbers: fail_numbers.iter().map(|s| s.to_string()).collect(),
            placed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TelephonyProvider for MockTelephony {
    fn name(&self) -> &str {
        "mock"
    }

    async fn place_call(&self, to: &str, _twiml: &str) -> Result<String, TelephonyError> {
        tokio::time::sleep(self.delay).await;
        if self.fail_numbers.contains(to) {
            return Err(TelephonyError::Provider(format!(
                "simulated refusal for {}",
                to
            )));
        }
        let n = self.placed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("CA-mock-{}", n))
    }

    async fn cancel_call(&self, _call_id: &str) -> Result<CallStatus, TelephonyError> {
        Ok(CallStatus::Canceled)
    }

    async fn fetch_status(&self, _call_id: &str) -> Result<CallStatus, TelephonyError> {
        Ok(CallStatus::Completed)
    }
}

/// Synthesizer mock that always produces a few bytes.
struct MockSynthesizer;

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, _text: &str, _language: Language) -> Result<Vec<u8>, AudioError> {
        Ok(vec![0u8; 16])
    }
}

fn config() -> Arc<Config> {
    Arc::new(Config {
        server: Default::default(),
        classifier: Default::default(),
        speech: Default::default(),
        telephony: Default::default(),
    })
}

fn judgment(services: &[ServiceKind], confidence: f64) -> ClassificationJudgment {
    ClassificationJudgment {
        is_emergency: true,
        severity: Severity::Severe,
        services: services.to_vec(),
        confidence,
        reasoning: "test".to_string(),
    }
}

#[tokio::test]
async fn batch_results_are_index_stable_under_partial_failure() {
    let config = config();
    // Fire's destination refuses; police and ambulance succeed.
    let fire_number = config.telephony.number_for(ServiceKind::Fire).to_string();
    let telephony = Arc::new(MockTelephony::new(Duration::ZERO, &[fire_number.as_str()]));
    let registry = Arc::new(CallRegistry::new());
    let dispatcher = Dispatcher::new(
        config,
        Arc::new(MockSynthesizer),
        telephony,
        registry.clone(),
    );

    let intents = decide(
        &judgment(
            &[
                ServiceKind::Police,
                ServiceKind::Fire,
                ServiceKind::Ambulance,
            ],
            0.9,
        ),
        Language::En,
    );
    assert_eq!(intents.len(), 3);

    let batch = dispatcher.dispatch("s1", "everything at once", &intents).await;

    // |results| == |intents| and result order equals intent order.
    assert_eq!(batch.results.len(), intents.len());
    for (result, intent) in batch.results.iter().zip(&intents) {
        assert_eq!(result.intent.service, intent.service);
    }

    // Exactly the fire branch failed; the others were placed and recorded.
    assert_eq!(batch.placed(), 2);
    assert_eq!(batch.failed(), 1);
    assert!(!batch.all_failed());
    for result in &batch.results {
        match (&result.outcome, result.intent.service) {
            (DispatchOutcome::Failed { reason }, ServiceKind::Fire) => {
                assert!(reason.contains("simulated refusal"));
            }
            (DispatchOutcome::Placed { call_id, .. }, _) => {
                let record = registry.get(call_id).unwrap();
                assert_eq!(record.status, CallStatus::Initiated);
                assert_eq!(record.session_id, "s1");
            }
            (outcome, service) => panic!("unexpected {:?} for {:?}", outcome, service),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn batch_latency_is_bounded_by_the_slowest_call_not_the_sum() {
    let config = config();
    let telephony = Arc::new(MockTelephony::new(Duration::from_secs(1), &[]));
    let registry = Arc::new(CallRegistry::new());
    let dispatcher = Dispatcher::new(
        config,
        Arc::new(MockSynthesizer),
        telephony,
        registry.clone(),
    );

    let intents = decide(
        &judgment(
            &[
                ServiceKind::Police,
                ServiceKind::Fire,
                ServiceKind::Ambulance,
            ],
            0.95,
        ),
        Language::En,
    );

    let started = tokio::time::Instant::now();
    let batch = dispatcher.dispatch("s1", "triple emergency", &intents).await;
    let elapsed = started.elapsed();

    assert_eq!(batch.placed(), 3);
    // Serialized dispatch would take 3s of virtual time; parallel takes 1s.
    assert!(
        elapsed < Duration::from_millis(1500),
        "dispatch serialized: took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn all_failed_batch_is_flagged() {
    let config = config();
    let numbers: Vec<String> = ServiceKind::ALL
        .iter()
        .map(|&s| config.telephony.number_for(s).to_string())
        .collect();
    let fail_refs: Vec<&str> = numbers.iter().map(|s| s.as_str()).collect();
    let telephony = Arc::new(MockTelephony::new(Duration::ZERO, &fail_refs));
    let registry = Arc::new(CallRegistry::new());
    let dispatcher = Dispatcher::new(
        config,
        Arc::new(MockSynthesizer),
        telephony,
        registry.clone(),
    );

    let intents = decide(&judgment(&[ServiceKind::Police], 0.8), Language::En);
    let batch = dispatcher.dispatch("s1", "robbery", &intents).await;

    assert!(batch.all_failed());
    assert!(registry.list_active("s1").is_empty());
}

#[tokio::test]
async fn loopback_base_yields_native_speech_for_every_call() {
    // Speech is enabled and the synthesizer works, but the default base
    // address is loopback — unreachable from the provider network, so
    // every call in the batch must fall back to native speech.
    let mut raw = Config {
        server: Default::default(),
        classifier: Default::default(),
        speech: Default::default(),
        telephony: Default::default(),
    };
    raw.speech.provider = "google".to_string();
    assert!(raw.server.public_base_url.contains("localhost"));
    let config = Arc::new(raw);

    let telephony = Arc::new(MockTelephony::new(Duration::ZERO, &[]));
    let registry = Arc::new(CallRegistry::new());
    let dispatcher = Dispatcher::new(
        config,
        Arc::new(MockSynthesizer),
        telephony,
        registry.clone(),
    );

    let intents = decide(
        &judgment(&[ServiceKind::Fire, ServiceKind::Ambulance], 0.91),
        Language::Si,
    );
    let batch = dispatcher.dispatch("s1", "ගින්නක්", &intents).await;

    assert_eq!(batch.placed(), 2);
    for result in &batch.results {
        match &result.outcome {
            DispatchOutcome::Placed { call_id, audio_ref } => {
                assert!(audio_ref.is_none());
                assert!(registry.get(call_id).unwrap().audio_ref.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

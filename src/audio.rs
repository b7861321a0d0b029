//! Speech synthesis and audio asset resolution for outbound calls.
//!
//! Each dispatched call may carry a playable recording of the user's own
//! message. That only works when the configured base address is reachable
//! from the telephony provider's network — a loopback base can never be
//! fetched by the provider, so the reachability check is a hard
//! precondition, not a heuristic. When the check fails, or synthesis
//! fails, the call falls back to provider-native speech (`audio_ref =
//! None`); an audio problem must never block an emergency call.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ServerConfig, SpeechConfig};
use crate::error::AudioError;
use crate::models::Language;

/// Trait for speech synthesis providers.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize `text` in `language`, returning MP3 bytes.
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, AudioError>;
}

/// Create the appropriate [`SpeechSynthesizer`] based on configuration.
pub fn create_synthesizer(config: &SpeechConfig) -> anyhow::Result<Arc<dyn SpeechSynthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSynthesizer)),
        "google" => Ok(Arc::new(GoogleTtsSynthesizer::new(config)?)),
        other => anyhow::bail!("Unknown speech provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op synthesizer used when speech is not configured.
pub struct DisabledSynthesizer;

#[async_trait]
impl SpeechSynthesizer for DisabledSynthesizer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn synthesize(&self, _text: &str, _language: Language) -> Result<Vec<u8>, AudioError> {
        Err(AudioError::Generation(
            "speech provider is disabled".to_string(),
        ))
    }
}

// ============ Google Translate TTS Provider ============

const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Characters per synthesis request; longer messages are cut, emergency
/// operators need the head of the message, not a novel.
const MAX_TTS_CHARS: usize = 500;

/// Synthesizer backed by the Google Translate TTS endpoint, which covers
/// all three supported languages including Sinhala and Tamil.
pub struct GoogleTtsSynthesizer {
    client: reqwest::Client,
}

impl GoogleTtsSynthesizer {
    pub fn new(config: &SpeechConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsSynthesizer {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, AudioError> {
        let clipped: String = text.chars().take(MAX_TTS_CHARS).collect();

        let resp = self
            .client
            .get(GOOGLE_TTS_URL)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", language.code()),
                ("q", clipped.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AudioError::Generation(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AudioError::Generation(format!(
                "TTS endpoint returned {}",
                status
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AudioError::Generation(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ============ Reachability & asset resolution ============

/// Whether the telephony provider's network can plausibly fetch from this
/// base address.
///
/// Expressed as a capability predicate over the parsed URL rather than a
/// substring check: an IP-literal host fails when `is_loopback()` holds
/// (covers `127.0.0.0/8` and `::1`), and the name `localhost` fails in any
/// case. Private-range addresses pass — a tunneled deployment is reachable
/// even when its bind address is not public.
pub fn publicly_reachable(base_url: &str) -> bool {
    let url = match reqwest::Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return false,
    };

    match url.host_str() {
        Some(host) => {
            // IPv6 literals come back bracketed from the URL parser.
            let bare = host.trim_start_matches('[').trim_end_matches(']');
            if let Ok(ip) = bare.parse::<std::net::IpAddr>() {
                !ip.is_loopback()
            } else {
                !host.eq_ignore_ascii_case("localhost")
            }
        }
        None => false,
    }
}

/// Content-addressed asset filename for a message + language pair.
fn asset_filename(message: &str, language: Language) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(language.code().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("call-{}-{}.mp3", &digest[..20], language.code())
}

/// Resolve the path of a stored asset by filename, rejecting anything that
/// could escape the storage directory.
pub fn asset_path(storage_dir: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return None;
    }
    Some(storage_dir.join(filename))
}

/// Produce a playable asset reference for one call, or `None` to signal
/// the provider-native speech fallback.
///
/// Steps: check the base address is reachable from the provider network,
/// synthesize the user's message in the intent's language, store it under
/// a content-addressed filename, and return the public URL. Synthesis and
/// storage failures are absorbed to `None` with a warning.
pub async fn resolve_audio(
    server: &ServerConfig,
    speech: &SpeechConfig,
    synthesizer: &dyn SpeechSynthesizer,
    message: &str,
    language: Language,
) -> Option<String> {
    if !speech.is_enabled() {
        return None;
    }
    if !publicly_reachable(&server.public_base_url) {
        tracing::debug!(
            base = %server.public_base_url,
            "base address not reachable by the provider network; using native speech"
        );
        return None;
    }

    let filename = asset_filename(message, language);
    let storage_dir = PathBuf::from(&speech.storage_dir);
    let path = storage_dir.join(&filename);

    let public_url = format!(
        "{}/audio/{}",
        server.public_base_url.trim_end_matches('/'),
        filename
    );

    // Content-addressed: an identical message in the same language reuses
    // the stored asset.
    if path.exists() {
        return Some(public_url);
    }

    let bytes = match synthesizer.synthesize(message, language).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "audio generation failed; falling back to native speech");
            return None;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&storage_dir)
        .and_then(|_| std::fs::write(&path, &bytes))
    {
        tracing::warn!(error = %e, path = %path.display(), "could not store audio asset");
        return None;
    }

    Some(public_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_forms_are_unreachable() {
        assert!(!publicly_reachable("http://localhost:8000"));
        assert!(!publicly_reachable("http://LOCALHOST:8000"));
        assert!(!publicly_reachable("http://127.0.0.1:8000"));
        assert!(!publicly_reachable("http://127.5.0.9"));
        assert!(!publicly_reachable("http://[::1]:3000"));
    }

    #[test]
    fn public_and_private_hosts_are_reachable() {
        assert!(publicly_reachable("https://bot.example.lk"));
        assert!(publicly_reachable("https://abc123.ngrok-free.app"));
        // Private ranges pass: tunnels and LAN-exposed deployments are the
        // provider's problem to reach, not ours to forbid.
        assert!(publicly_reachable("http://192.168.1.5:8000"));
    }

    #[test]
    fn garbage_base_is_unreachable() {
        assert!(!publicly_reachable("not a url"));
        assert!(!publicly_reachable(""));
    }

    #[test]
    fn filenames_are_stable_and_language_scoped() {
        let a = asset_filename("there is a fire", Language::En);
        let b = asset_filename("there is a fire", Language::En);
        let c = asset_filename("there is a fire", Language::Si);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with("-en.mp3"));
        assert!(c.ends_with("-si.mp3"));
    }

    #[test]
    fn asset_path_rejects_traversal() {
        let dir = Path::new("/srv/audio");
        assert!(asset_path(dir, "call-abc-en.mp3").is_some());
        assert!(asset_path(dir, "../secrets.txt").is_none());
        assert!(asset_path(dir, "a/b.mp3").is_none());
        assert!(asset_path(dir, "a\\b.mp3").is_none());
        assert!(asset_path(dir, "").is_none());
    }

    #[tokio::test]
    async fn loopback_base_always_falls_back_to_native_speech() {
        let server = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
        };
        let speech = SpeechConfig {
            provider: "google".to_string(),
            storage_dir: "./unused".to_string(),
            timeout_secs: 5,
        };
        let synth = DisabledSynthesizer;
        for language in [Language::En, Language::Si, Language::Ta] {
            let url = resolve_audio(&server, &speech, &synth, "ගෙදර ගිනි", language).await;
            assert!(url.is_none());
        }
    }
}

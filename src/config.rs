use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::models::ServiceKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub telephony: TelephonyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base address the telephony provider's network uses to fetch audio
    /// assets. A loopback address here disables hosted audio entirely.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_classifier_provider")]
    pub provider: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Hard budget for one classification call. Sits in the critical path
    /// of an emergency response, so it stays in single digits.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_classifier_provider(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

impl ClassifierConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_classifier_provider() -> String {
    "disabled".to_string()
}
fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_classifier_timeout() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    /// `"google"` or `"disabled"`.
    #[serde(default = "default_speech_provider")]
    pub provider: String,
    /// Directory generated audio assets are stored in and served from.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            storage_dir: default_storage_dir(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

impl SpeechConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_speech_provider() -> String {
    "disabled".to_string()
}
fn default_storage_dir() -> String {
    "./data/audio".to_string()
}
fn default_speech_timeout() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    /// `"twilio"` or `"disabled"`. Credentials come from the
    /// `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` environment.
    #[serde(default = "default_telephony_provider")]
    pub provider: String,
    /// Outbound caller id.
    #[serde(default = "default_caller_number")]
    pub caller_number: String,
    #[serde(default)]
    pub numbers: EmergencyNumbers,
    /// Budget for one call-creation request. Longer than the classifier's
    /// but still bounded; a hung dispatch must not stall its siblings.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_secs: u64,
    /// How often the per-call monitor polls the provider for status.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Give up polling a call after this long even if no terminal status
    /// was observed.
    #[serde(default = "default_poll_budget")]
    pub poll_budget_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            provider: default_telephony_provider(),
            caller_number: default_caller_number(),
            numbers: EmergencyNumbers::default(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            cancel_timeout_secs: default_cancel_timeout(),
            poll_interval_secs: default_poll_interval(),
            poll_budget_secs: default_poll_budget(),
        }
    }
}

impl TelephonyConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn number_for(&self, service: ServiceKind) -> &str {
        match service {
            ServiceKind::Police => &self.numbers.police,
            ServiceKind::Fire => &self.numbers.fire,
            ServiceKind::Ambulance => &self.numbers.ambulance,
        }
    }
}

fn default_telephony_provider() -> String {
    "disabled".to_string()
}
fn default_caller_number() -> String {
    "+15673721765".to_string()
}
fn default_dispatch_timeout() -> u64 {
    15
}
fn default_cancel_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    5
}
fn default_poll_budget() -> u64 {
    600
}

/// Destination numbers per emergency service. Defaults are the Sri Lanka
/// national services the assistant was built for.
#[derive(Debug, Deserialize, Clone)]
pub struct EmergencyNumbers {
    #[serde(default = "default_police_number")]
    pub police: String,
    #[serde(default = "default_fire_number")]
    pub fire: String,
    #[serde(default = "default_ambulance_number")]
    pub ambulance: String,
}

impl Default for EmergencyNumbers {
    fn default() -> Self {
        Self {
            police: default_police_number(),
            fire: default_fire_number(),
            ambulance: default_ambulance_number(),
        }
    }
}

fn default_police_number() -> String {
    "+94119".to_string()
}
fn default_fire_number() -> String {
    "+94110".to_string()
}
fn default_ambulance_number() -> String {
    "+941990".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.classifier.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown classifier provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.classifier.timeout_secs == 0 {
        anyhow::bail!("classifier.timeout_secs must be > 0");
    }

    match config.speech.provider.as_str() {
        "disabled" | "google" => {}
        other => anyhow::bail!(
            "Unknown speech provider: '{}'. Must be disabled or google.",
            other
        ),
    }
    if config.speech.timeout_secs == 0 {
        anyhow::bail!("speech.timeout_secs must be > 0");
    }

    match config.telephony.provider.as_str() {
        "disabled" | "twilio" => {}
        other => anyhow::bail!(
            "Unknown telephony provider: '{}'. Must be disabled or twilio.",
            other
        ),
    }
    if config.telephony.is_enabled() {
        for service in ServiceKind::ALL {
            if config.telephony.number_for(service).is_empty() {
                anyhow::bail!("telephony.numbers.{} must not be empty", service.as_str());
            }
        }
        if config.telephony.caller_number.is_empty() {
            anyhow::bail!("telephony.caller_number must not be empty");
        }
    }
    if config.telephony.dispatch_timeout_secs == 0 || config.telephony.cancel_timeout_secs == 0 {
        anyhow::bail!("telephony timeouts must be > 0");
    }
    if config.telephony.poll_interval_secs == 0 {
        anyhow::bail!("telephony.poll_interval_secs must be > 0");
    }

    if reqwest::Url::parse(&config.server.public_base_url).is_err() {
        anyhow::bail!(
            "server.public_base_url is not a valid URL: '{}'",
            config.server.public_base_url
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.classifier.provider, "disabled");
        assert_eq!(config.telephony.numbers.police, "+94119");
        assert_eq!(config.telephony.numbers.ambulance, "+941990");
        validate(&config).unwrap();
    }

    #[test]
    fn rejects_unknown_provider() {
        let config: Config = toml::from_str("[classifier]\nprovider = \"oracle\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_empty_destination_number() {
        let config: Config = toml::from_str(
            "[telephony]\nprovider = \"twilio\"\n[telephony.numbers]\nfire = \"\"\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_bad_base_url() {
        let config: Config =
            toml::from_str("[server]\npublic_base_url = \"not a url\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}

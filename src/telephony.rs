//! Telephony provider abstraction: placing, cancelling, and polling calls.
//!
//! The [`TelephonyProvider`] trait is the single seam to the outside phone
//! network. [`TwilioProvider`] talks to the Twilio REST API; the disabled
//! implementation reports itself unconfigured so every dispatch surfaces a
//! clean per-intent failure instead of a panic.
//!
//! The provider is the authority on call state: whatever status it reports
//! is mirrored into the registry, never second-guessed.

use async_trait::async_trait;
use quick_xml::events::BytesText;
use quick_xml::Writer;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TelephonyConfig;
use crate::error::TelephonyError;
use crate::models::{CallStatus, ServiceKind};

/// Trait for outbound telephony providers.
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Place an outbound call playing `twiml`; returns the provider's call
    /// id on acceptance.
    async fn place_call(&self, to: &str, twiml: &str) -> Result<String, TelephonyError>;

    /// Ask the provider to stop a call. Returns the call's status after
    /// the attempt — `Canceled` when the provider obliged, or the actual
    /// status (e.g. `Completed`) when it could not be stopped.
    async fn cancel_call(&self, call_id: &str) -> Result<CallStatus, TelephonyError>;

    /// Current provider-side status of a call.
    async fn fetch_status(&self, call_id: &str) -> Result<CallStatus, TelephonyError>;
}

/// Create the appropriate [`TelephonyProvider`] based on configuration.
pub fn create_provider(config: &TelephonyConfig) -> anyhow::Result<Arc<dyn TelephonyProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "twilio" => Ok(Arc::new(TwilioProvider::new(config)?)),
        other => anyhow::bail!("Unknown telephony provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// Stand-in used when no telephony credentials are configured.
pub struct DisabledProvider;

#[async_trait]
impl TelephonyProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn place_call(&self, _to: &str, _twiml: &str) -> Result<String, TelephonyError> {
        Err(TelephonyError::NotConfigured)
    }

    async fn cancel_call(&self, _call_id: &str) -> Result<CallStatus, TelephonyError> {
        Err(TelephonyError::NotConfigured)
    }

    async fn fetch_status(&self, _call_id: &str) -> Result<CallStatus, TelephonyError> {
        Err(TelephonyError::NotConfigured)
    }
}

// ============ Twilio Provider ============

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Provider backed by the Twilio Programmable Voice REST API.
///
/// Requires `TWILIO_ACCOUNT_SID` and `TWILIO_AUTH_TOKEN` in the
/// environment. Call creation and cancellation carry separate timeouts
/// from configuration.
pub struct TwilioProvider {
    account_sid: String,
    auth_token: String,
    caller_number: String,
    dispatch_timeout: Duration,
    cancel_timeout: Duration,
    client: reqwest::Client,
}

/// The slice of a Twilio call resource we care about.
#[derive(Deserialize)]
struct TwilioCall {
    sid: String,
    status: String,
}

impl TwilioProvider {
    pub fn new(config: &TelephonyConfig) -> anyhow::Result<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID")
            .map_err(|_| anyhow::anyhow!("TWILIO_ACCOUNT_SID environment variable not set"))?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN")
            .map_err(|_| anyhow::anyhow!("TWILIO_AUTH_TOKEN environment variable not set"))?;

        Ok(Self {
            account_sid,
            auth_token,
            caller_number: config.caller_number.clone(),
            dispatch_timeout: Duration::from_secs(config.dispatch_timeout_secs),
            cancel_timeout: Duration::from_secs(config.cancel_timeout_secs),
            client: reqwest::Client::new(),
        })
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", TWILIO_API_BASE, self.account_sid)
    }

    fn call_url(&self, call_id: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            TWILIO_API_BASE, self.account_sid, call_id
        )
    }

    fn parse_status(&self, call: &TwilioCall) -> CallStatus {
        CallStatus::from_provider(&call.status).unwrap_or_else(|| {
            tracing::warn!(status = %call.status, sid = %call.sid, "unknown provider status");
            CallStatus::Queued
        })
    }

    fn map_err(&self, e: reqwest::Error, budget: Duration) -> TelephonyError {
        if e.is_timeout() {
            TelephonyError::Timeout(budget.as_secs())
        } else {
            TelephonyError::Provider(e.to_string())
        }
    }
}

#[async_trait]
impl TelephonyProvider for TwilioProvider {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn place_call(&self, to: &str, twiml: &str) -> Result<String, TelephonyError> {
        let params = [
            ("To", to),
            ("From", self.caller_number.as_str()),
            ("Twiml", twiml),
        ];

        let resp = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .timeout(self.dispatch_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e, self.dispatch_timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Provider(format!(
                "call creation failed with {}: {}",
                status, body
            )));
        }

        let call: TwilioCall = resp
            .json()
            .await
            .map_err(|e| TelephonyError::Provider(e.to_string()))?;
        Ok(call.sid)
    }

    async fn cancel_call(&self, call_id: &str) -> Result<CallStatus, TelephonyError> {
        let resp = self
            .client
            .post(self.call_url(call_id))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "canceled")])
            .timeout(self.cancel_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e, self.cancel_timeout))?;

        if resp.status().is_success() {
            let call: TwilioCall = resp
                .json()
                .await
                .map_err(|e| TelephonyError::Provider(e.to_string()))?;
            return Ok(self.parse_status(&call));
        }

        // The provider refused the cancellation, typically because the call
        // already reached a terminal state on its side. Fetch the truth so
        // the registry can be reconciled.
        self.fetch_status(call_id).await
    }

    async fn fetch_status(&self, call_id: &str) -> Result<CallStatus, TelephonyError> {
        let resp = self
            .client
            .get(self.call_url(call_id))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(self.cancel_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e, self.cancel_timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Provider(format!(
                "status fetch failed with {}: {}",
                status, body
            )));
        }

        let call: TwilioCall = resp
            .json()
            .await
            .map_err(|e| TelephonyError::Provider(e.to_string()))?;
        Ok(self.parse_status(&call))
    }
}

// ============ TwiML ============

const TWIML_VOICE: &str = "Polly.Aditi";
const TWIML_VOICE_LANGUAGE: &str = "en-IN";

/// Longest user message spoken via `<Say>` when no audio asset exists.
const MAX_SAY_CHARS: usize = 200;

/// Build the TwiML document played to the emergency operator.
///
/// With an audio asset: an English intro, then the user's own recorded
/// message via `<Play>`. Without one: the intro plus a truncated `<Say>`
/// of the message text. Text goes through the XML writer so user content
/// is always escaped.
pub fn build_twiml(
    service: ServiceKind,
    user_message: &str,
    audio_url: Option<&str>,
) -> Result<String, TelephonyError> {
    let intro = format!(
        "This is an emergency call from Crime Guard Chat Bot. \
         A user has requested {} assistance.",
        service.as_str()
    );

    let mut writer = Writer::new(Vec::new());
    writer
        .create_element("Response")
        .write_inner_content(|w| {
            say(w, &intro)?;
            pause(w, "1")?;
            match audio_url {
                Some(url) => {
                    say(w, "The user's message follows:")?;
                    w.create_element("Play")
                        .write_text_content(BytesText::new(url))?;
                }
                None => {
                    let clipped: String = user_message.chars().take(MAX_SAY_CHARS).collect();
                    say(w, &format!("The user's message is: {}", clipped))?;
                }
            }
            pause(w, "1")?;
            say(w, "Please assist immediately.")?;
            pause(w, "2")?;
            Ok::<(), quick_xml::Error>(())
        })
        .map_err(|e| TelephonyError::Provider(format!("twiml build failed: {}", e)))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| TelephonyError::Provider(format!("twiml not utf-8: {}", e)))
}

fn say<W: std::io::Write>(w: &mut Writer<W>, text: &str) -> Result<(), quick_xml::Error> {
    w.create_element("Say")
        .with_attribute(("voice", TWIML_VOICE))
        .with_attribute(("language", TWIML_VOICE_LANGUAGE))
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn pause<W: std::io::Write>(w: &mut Writer<W>, length: &str) -> Result<(), quick_xml::Error> {
    w.create_element("Pause")
        .with_attribute(("length", length))
        .write_empty()?;
    Ok(())
}

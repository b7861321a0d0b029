//! Typed error taxonomy for the dispatch core.
//!
//! Components return these from their public operations; the server layer
//! maps them onto HTTP codes and the pipeline absorbs the ones with safe
//! defaults (classifier and audio failures never fail a user request).

use thiserror::Error;

use crate::models::CallStatus;

/// Failures of the external classification provider.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// The provider was unreachable or exceeded its time budget. The
    /// pipeline treats the message as non-emergency and flags degraded mode.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something we could not parse into a
    /// judgment.
    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

/// Failures while synthesizing or storing a speech asset.
///
/// Always non-fatal: dispatch proceeds with the provider-native speech
/// fallback.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("speech synthesis failed: {0}")]
    Generation(String),

    #[error("could not store audio asset: {0}")]
    Storage(#[from] std::io::Error),
}

/// Failures of the telephony provider.
#[derive(Error, Debug)]
pub enum TelephonyError {
    /// No credentials configured; calls cannot be placed at all.
    #[error("telephony provider not configured")]
    NotConfigured,

    #[error("telephony provider error: {0}")]
    Provider(String),

    #[error("telephony request timed out after {0}s")]
    Timeout(u64),
}

/// Violations of the call registry's ownership and lifecycle contract.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no call registered with id {0}")]
    NotFound(String),

    /// Attempted to move a record out of a terminal status. This is a
    /// programming-contract violation or a lost race against another
    /// terminal writer; the offending update is dropped, never applied.
    #[error("call {call_id} is already {from}; cannot transition to {to}")]
    InvalidTransition {
        call_id: String,
        from: CallStatus,
        to: CallStatus,
    },
}

/// Failures of a cancellation request.
#[derive(Error, Debug)]
pub enum CancelError {
    #[error("no call registered with id {0}")]
    NotFound(String),

    /// The provider reports the call cannot be stopped (typically already
    /// completed on the provider side). The registry has been reconciled
    /// to the provider's status, not forced to canceled.
    #[error("provider rejected cancellation: call is {provider_status}")]
    Rejected { provider_status: CallStatus },

    #[error("telephony provider error: {0}")]
    Provider(String),
}

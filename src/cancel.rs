//! Cancellation and status service.
//!
//! Cancellation is request-scoped to a single call id; the only batch form
//! is session-scoped. Cancelling a call that already reached a terminal
//! state is an idempotent success — the desired end state holds, there is
//! nothing to do. When the provider refuses to stop a call the registry is
//! reconciled to the provider's truth (typically `completed`), never
//! forced to `canceled`.

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::error::{CancelError, RegistryError};
use crate::models::{CallRecord, CallStatus, ServiceKind};
use crate::registry::CallRegistry;
use crate::telephony::TelephonyProvider;

/// Cancel one call.
///
/// Idempotent: a call already in a terminal state returns `Ok` with the
/// record unchanged and no provider round-trip. Otherwise the provider is
/// asked to stop the call and the registry mirrors whatever status the
/// provider reports back.
pub async fn cancel_call(
    telephony: &dyn TelephonyProvider,
    registry: &CallRegistry,
    call_id: &str,
) -> Result<CallRecord, CancelError> {
    let record = registry
        .get(call_id)
        .map_err(|_| CancelError::NotFound(call_id.to_string()))?;

    if record.status.is_terminal() {
        return Ok(record);
    }

    match telephony.cancel_call(call_id).await {
        Ok(CallStatus::Canceled) => {
            match registry.update_status(call_id, CallStatus::Canceled, None) {
                Ok(record) => Ok(record),
                // A provider webhook finished the call while our request
                // was in flight; the record is terminal either way.
                Err(RegistryError::InvalidTransition { .. }) => registry
                    .get(call_id)
                    .map_err(|_| CancelError::NotFound(call_id.to_string())),
                Err(RegistryError::NotFound(_)) => {
                    Err(CancelError::NotFound(call_id.to_string()))
                }
            }
        }
        Ok(actual) => {
            // The provider could not stop the call. Correct our mirror to
            // the provider's status and report the rejection.
            let _ = registry.update_status(call_id, actual, None);
            Err(CancelError::Rejected {
                provider_status: actual,
            })
        }
        Err(e) => Err(CancelError::Provider(e.to_string())),
    }
}

/// What happened to one call during a session-wide cancellation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelDisposition {
    Canceled,
    /// The provider refused; the registry now shows the provider's status.
    Rejected { status: CallStatus },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCancelOutcome {
    pub call_id: String,
    pub service: ServiceKind,
    #[serde(flatten)]
    pub disposition: CancelDisposition,
}

/// Result of cancelling every active call of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCancelReport {
    pub session_id: String,
    pub requested: usize,
    pub canceled: usize,
    pub failed: usize,
    /// One entry per active call, in `started_at` order — never silently
    /// dropped, same guarantee as dispatch.
    pub outcomes: Vec<SessionCancelOutcome>,
}

/// Cancel every active call for a session, concurrently.
///
/// Not atomic by design: one rejected cancellation must not block the
/// others. The report enumerates every attempted call with its outcome.
pub async fn cancel_session(
    telephony: Arc<dyn TelephonyProvider>,
    registry: Arc<CallRegistry>,
    session_id: &str,
) -> SessionCancelReport {
    let active = registry.list_active(session_id);
    let mut set: JoinSet<(usize, CancelDisposition)> = JoinSet::new();

    for (index, record) in active.iter().enumerate() {
        let telephony = telephony.clone();
        let registry = registry.clone();
        let call_id = record.call_id.clone();

        set.spawn(async move {
            let disposition = match cancel_call(telephony.as_ref(), &registry, &call_id).await {
                Ok(_) => CancelDisposition::Canceled,
                Err(CancelError::Rejected { provider_status }) => CancelDisposition::Rejected {
                    status: provider_status,
                },
                Err(e) => CancelDisposition::Failed {
                    reason: e.to_string(),
                },
            };
            (index, disposition)
        });
    }

    let mut slots: Vec<Option<CancelDisposition>> = vec![None; active.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, disposition)) => slots[index] = Some(disposition),
            Err(e) => tracing::error!(error = %e, "cancel branch aborted"),
        }
    }

    let outcomes: Vec<SessionCancelOutcome> = active
        .iter()
        .zip(slots)
        .map(|(record, slot)| SessionCancelOutcome {
            call_id: record.call_id.clone(),
            service: record.service,
            disposition: slot.unwrap_or_else(|| CancelDisposition::Failed {
                reason: "cancel branch aborted".to_string(),
            }),
        })
        .collect();

    let canceled = outcomes
        .iter()
        .filter(|o| matches!(o.disposition, CancelDisposition::Canceled))
        .count();

    SessionCancelReport {
        session_id: session_id.to_string(),
        requested: outcomes.len(),
        canceled,
        failed: outcomes.len() - canceled,
        outcomes,
    }
}

//! Per-call status monitor.
//!
//! For every placed call a lightweight poller mirrors the provider's status
//! into the registry until the call reaches a terminal state. Provider
//! webhooks do the same job faster when they arrive; the poller is the
//! fallback that guarantees no call is left dangling in a non-terminal
//! state if callbacks are lost. Both writers funnel through
//! `Registry::update_status`, so a race between them (or with an explicit
//! cancellation) is settled by the terminal-state guard: the monitor treats
//! a rejected transition as "someone else finished this call" and stops.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TelephonyConfig;
use crate::error::RegistryError;
use crate::registry::CallRegistry;
use crate::telephony::TelephonyProvider;

/// Spawn a poller for one call. Returns the task handle; callers normally
/// drop it and let the task run to completion on its own.
pub fn spawn(
    telephony: Arc<dyn TelephonyProvider>,
    registry: Arc<CallRegistry>,
    config: &TelephonyConfig,
    call_id: String,
) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(config.poll_interval_secs);
    let budget = Duration::from_secs(config.poll_budget_secs);

    tokio::spawn(async move {
        let started = tokio::time::Instant::now();

        loop {
            tokio::time::sleep(interval).await;

            if started.elapsed() >= budget {
                tracing::warn!(call_id = %call_id, "poll budget exhausted; stopping monitor");
                break;
            }

            let status = match telephony.fetch_status(&call_id).await {
                Ok(status) => status,
                Err(e) => {
                    // Transient provider trouble; the next tick retries.
                    tracing::warn!(call_id = %call_id, error = %e, "status poll failed");
                    continue;
                }
            };

            match registry.update_status(&call_id, status, None) {
                Ok(record) if record.status.is_terminal() => {
                    tracing::info!(
                        call_id = %call_id,
                        status = record.status.as_str(),
                        "call reached terminal state"
                    );
                    break;
                }
                Ok(_) => {}
                Err(RegistryError::InvalidTransition { .. }) => {
                    // Another writer already finished the call.
                    break;
                }
                Err(RegistryError::NotFound(_)) => {
                    tracing::warn!(call_id = %call_id, "monitored call vanished from registry");
                    break;
                }
            }
        }
    })
}

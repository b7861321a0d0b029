//! The call registry: single source of truth for all call records.
//!
//! Arena-indexed: calls live in one map keyed by provider call id, with a
//! session index on the side. Per-record mutual exclusion is the only
//! locking granularity — the outer maps are only locked long enough to
//! clone an `Arc`, so status writers on different calls never contend.
//!
//! The registry is a mirror of provider state, not an opinion: every
//! transition is accepted unconditionally except moves out of a terminal
//! status. That one guard is what resolves the race between cancellation
//! and provider-driven completion deterministically — whichever terminal
//! transition lands first wins, and the loser no-ops.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::RegistryError;
use crate::models::{CallRecord, CallStatus};

/// Published on every accepted status transition.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub call_id: String,
    pub session_id: String,
    pub from: CallStatus,
    pub to: CallStatus,
}

/// Aggregate counts over every record the registry has seen.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub by_service: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
    pub by_language: HashMap<String, usize>,
}

pub struct CallRegistry {
    calls: RwLock<HashMap<String, Arc<Mutex<CallRecord>>>>,
    sessions: RwLock<HashMap<String, Vec<String>>>,
    events: broadcast::Sender<CallEvent>,
}

impl CallRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            calls: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Observe status transitions. Receivers that lag simply miss events;
    /// the registry itself is always the authoritative read.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Insert a freshly dispatched record. Called by the dispatcher,
    /// exactly once per successful dispatch.
    pub fn create(&self, record: CallRecord) {
        let call_id = record.call_id.clone();
        let session_id = record.session_id.clone();

        self.calls
            .write()
            .unwrap()
            .insert(call_id.clone(), Arc::new(Mutex::new(record)));
        self.sessions
            .write()
            .unwrap()
            .entry(session_id)
            .or_default()
            .push(call_id);
    }

    fn entry(&self, call_id: &str) -> Result<Arc<Mutex<CallRecord>>, RegistryError> {
        self.calls
            .read()
            .unwrap()
            .get(call_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(call_id.to_string()))
    }

    pub fn get(&self, call_id: &str) -> Result<CallRecord, RegistryError> {
        Ok(self.entry(call_id)?.lock().unwrap().clone())
    }

    /// Apply a status transition reported by the provider or requested by
    /// the cancellation service.
    ///
    /// Re-asserting the current status is a no-op (still updates a newly
    /// reported duration); moving out of a terminal status is rejected with
    /// [`RegistryError::InvalidTransition`] and the update is dropped.
    pub fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        duration_seconds: Option<u32>,
    ) -> Result<CallRecord, RegistryError> {
        let entry = self.entry(call_id)?;
        let mut record = entry.lock().unwrap();

        if record.status == status {
            if duration_seconds.is_some() {
                record.duration_seconds = duration_seconds;
            }
            return Ok(record.clone());
        }

        if record.status.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                call_id: call_id.to_string(),
                from: record.status,
                to: status,
            });
        }

        let from = record.status;
        record.status = status;
        if duration_seconds.is_some() {
            record.duration_seconds = duration_seconds;
        }
        let updated = record.clone();
        drop(record);

        // Nobody listening is fine.
        let _ = self.events.send(CallEvent {
            call_id: updated.call_id.clone(),
            session_id: updated.session_id.clone(),
            from,
            to: status,
        });

        Ok(updated)
    }

    /// All non-terminal records for a session, ordered by start time.
    pub fn list_active(&self, session_id: &str) -> Vec<CallRecord> {
        let mut records: Vec<CallRecord> = self
            .session_records(session_id)
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .collect();
        records.sort_by_key(|r| r.started_at);
        records
    }

    /// Every record for a session, terminal or not, ordered by start time.
    pub fn list_session(&self, session_id: &str) -> Vec<CallRecord> {
        let mut records = self.session_records(session_id);
        records.sort_by_key(|r| r.started_at);
        records
    }

    fn session_records(&self, session_id: &str) -> Vec<CallRecord> {
        let ids: Vec<String> = self
            .sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default();

        let calls = self.calls.read().unwrap();
        ids.iter()
            .filter_map(|id| calls.get(id))
            .map(|entry| entry.lock().unwrap().clone())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let calls = self.calls.read().unwrap();
        let mut stats = RegistryStats {
            total: 0,
            active: 0,
            by_service: HashMap::new(),
            by_status: HashMap::new(),
            by_language: HashMap::new(),
        };

        for entry in calls.values() {
            let record = entry.lock().unwrap();
            stats.total += 1;
            if !record.status.is_terminal() {
                stats.active += 1;
            }
            *stats
                .by_service
                .entry(record.service.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_status
                .entry(record.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_language
                .entry(record.language.code().to_string())
                .or_default() += 1;
        }

        stats
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, ServiceKind};
    use chrono::{Duration as ChronoDuration, Utc};

    fn record(call_id: &str, session: &str, status: CallStatus) -> CallRecord {
        CallRecord {
            call_id: call_id.to_string(),
            service: ServiceKind::Police,
            status,
            language: Language::En,
            started_at: Utc::now(),
            duration_seconds: None,
            audio_ref: None,
            session_id: session.to_string(),
        }
    }

    #[test]
    fn create_then_get() {
        let registry = CallRegistry::new();
        registry.create(record("CA1", "s1", CallStatus::Initiated));
        let r = registry.get("CA1").unwrap();
        assert_eq!(r.status, CallStatus::Initiated);
        assert_eq!(r.session_id, "s1");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = CallRegistry::new();
        assert!(matches!(
            registry.get("CA404"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn normal_transitions_accepted() {
        let registry = CallRegistry::new();
        registry.create(record("CA1", "s1", CallStatus::Initiated));
        registry
            .update_status("CA1", CallStatus::Ringing, None)
            .unwrap();
        registry
            .update_status("CA1", CallStatus::InProgress, None)
            .unwrap();
        let r = registry
            .update_status("CA1", CallStatus::Completed, Some(42))
            .unwrap();
        assert_eq!(r.status, CallStatus::Completed);
        assert_eq!(r.duration_seconds, Some(42));
    }

    #[test]
    fn terminal_records_are_immutable() {
        let registry = CallRegistry::new();
        registry.create(record("CA1", "s1", CallStatus::Initiated));
        registry
            .update_status("CA1", CallStatus::Completed, None)
            .unwrap();

        // Any move out of a terminal status is rejected, including into a
        // different terminal status.
        for next in [
            CallStatus::Ringing,
            CallStatus::InProgress,
            CallStatus::Canceled,
            CallStatus::Failed,
        ] {
            assert!(matches!(
                registry.update_status("CA1", next, None),
                Err(RegistryError::InvalidTransition { .. })
            ));
        }
        assert_eq!(registry.get("CA1").unwrap().status, CallStatus::Completed);
    }

    #[test]
    fn reasserting_current_status_is_a_noop() {
        let registry = CallRegistry::new();
        registry.create(record("CA1", "s1", CallStatus::Initiated));
        registry
            .update_status("CA1", CallStatus::Canceled, None)
            .unwrap();
        // The webhook echoing the cancel after the fact must not error.
        let r = registry
            .update_status("CA1", CallStatus::Canceled, None)
            .unwrap();
        assert_eq!(r.status, CallStatus::Canceled);
    }

    #[test]
    fn list_active_filters_and_orders() {
        let registry = CallRegistry::new();
        let now = Utc::now();

        let mut first = record("CA1", "s1", CallStatus::Ringing);
        first.started_at = now - ChronoDuration::seconds(30);
        let mut second = record("CA2", "s1", CallStatus::InProgress);
        second.started_at = now;
        let done = record("CA3", "s1", CallStatus::Completed);
        let other = record("CA4", "s2", CallStatus::Ringing);

        // Insert out of start order to prove the sort.
        registry.create(second);
        registry.create(first);
        registry.create(done);
        registry.create(other);

        let active = registry.list_active("s1");
        let ids: Vec<&str> = active.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["CA1", "CA2"]);
    }

    #[test]
    fn events_published_on_transition() {
        let registry = CallRegistry::new();
        let mut rx = registry.subscribe();
        registry.create(record("CA1", "s1", CallStatus::Initiated));
        registry
            .update_status("CA1", CallStatus::Ringing, None)
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.call_id, "CA1");
        assert_eq!(event.from, CallStatus::Initiated);
        assert_eq!(event.to, CallStatus::Ringing);
    }

    #[test]
    fn stats_count_by_dimension() {
        let registry = CallRegistry::new();
        registry.create(record("CA1", "s1", CallStatus::Ringing));
        let mut amb = record("CA2", "s1", CallStatus::Completed);
        amb.service = ServiceKind::Ambulance;
        registry.create(amb);

        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.by_service.get("police"), Some(&1));
        assert_eq!(stats.by_service.get("ambulance"), Some(&1));
        assert_eq!(stats.by_status.get("ringing"), Some(&1));
    }

    #[test]
    fn writers_on_different_records_do_not_interfere() {
        let registry = Arc::new(CallRegistry::new());
        for i in 0..8 {
            registry.create(record(&format!("CA{}", i), "s1", CallStatus::Initiated));
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                let id = format!("CA{}", i);
                registry.update_status(&id, CallStatus::Ringing, None).unwrap();
                registry
                    .update_status(&id, CallStatus::Completed, Some(i as u32))
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..8 {
            let r = registry.get(&format!("CA{}", i)).unwrap();
            assert_eq!(r.status, CallStatus::Completed);
            assert_eq!(r.duration_seconds, Some(i as u32));
        }
    }
}

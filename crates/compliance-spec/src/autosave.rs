//! Debounced persistence of reviewer edits.
//!
//! Callers drive the clock: every operation takes the current `Instant`, so
//! hosts can poll from an event loop and tests stay deterministic. A new edit
//! for a key cancels the write already pending for it; independent keys never
//! delay each other.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::feedback::FeedbackStore;
use crate::spec::feedback::FeedbackFile;

pub const DEFAULT_QUIET_PERIOD_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
}

fn default_quiet_period_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
        }
    }
}

impl AutosaveConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

#[derive(Debug, Clone)]
struct PendingWrite<V> {
    value: V,
    due: Instant,
}

/// Coalesces bursts of values per key into one delivery after a quiet period.
#[derive(Debug, Clone)]
pub struct Debouncer<K, V> {
    quiet_period: Duration,
    pending: BTreeMap<K, PendingWrite<V>>,
}

impl<K: Ord + Clone, V> Debouncer<K, V> {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &AutosaveConfig) -> Self {
        Self::new(config.quiet_period())
    }

    /// Replace any pending value for `key` and restart its quiet period.
    /// Returns the value that was superseded, if any.
    pub fn schedule(&mut self, key: K, value: V, now: Instant) -> Option<V> {
        let due = now + self.quiet_period;
        self.pending
            .insert(key, PendingWrite { value, due })
            .map(|previous| previous.value)
    }

    pub fn cancel(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|pending| pending.value)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Earliest instant at which `take_due` will yield something.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    /// Remove and return every value whose quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        due.into_iter()
            .filter_map(|key| {
                let pending = self.pending.remove(&key)?;
                Some((key, pending.value))
            })
            .collect()
    }

    /// Remove and return everything pending regardless of timing.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, pending)| (key, pending.value))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct FlushReport {
    pub saved: Vec<FeedbackFile>,
    pub failed: Vec<(String, FormError)>,
}

/// Feedback edits keyed by form id, written to a [`FeedbackStore`] once quiet.
#[derive(Debug)]
pub struct FeedbackAutosave {
    store: FeedbackStore,
    debouncer: Debouncer<String, FeedbackFile>,
}

impl FeedbackAutosave {
    pub fn new(store: FeedbackStore, config: &AutosaveConfig) -> Self {
        Self {
            store,
            debouncer: Debouncer::from_config(config),
        }
    }

    pub fn store(&self) -> &FeedbackStore {
        &self.store
    }

    /// Record the latest state of a form's feedback.
    pub fn record(&mut self, feedback: FeedbackFile, now: Instant) {
        let form_id = feedback.form_id.clone();
        if self.debouncer.schedule(form_id.clone(), feedback, now).is_some() {
            tracing::debug!(form_id = %form_id, "pending feedback write superseded");
        }
    }

    pub fn is_pending(&self, form_id: &str) -> bool {
        self.debouncer.is_pending(&form_id.to_string())
    }

    pub fn flush_due(&mut self, now: Instant) -> FlushReport {
        let due = self.debouncer.take_due(now);
        self.write_all(due)
    }

    /// Write everything pending immediately, e.g. on shutdown.
    pub fn flush_all(&mut self) -> FlushReport {
        let pending = self.debouncer.drain();
        self.write_all(pending)
    }

    fn write_all(&self, writes: Vec<(String, FeedbackFile)>) -> FlushReport {
        let mut report = FlushReport::default();
        for (form_id, feedback) in writes {
            match self.store.save(feedback) {
                Ok(saved) => report.saved.push(saved),
                Err(err) => {
                    tracing::warn!(form_id = %form_id, "autosave failed: {}", err);
                    report.failed.push((form_id, err));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackLoad;

    #[test]
    fn burst_of_edits_coalesces_into_last_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(2));
        debouncer.schedule("cdd-trusts", 1, start);
        debouncer.schedule("cdd-trusts", 2, start + Duration::from_millis(500));
        debouncer.schedule("cdd-trusts", 3, start + Duration::from_millis(1500));

        assert!(debouncer.take_due(start + Duration::from_millis(3000)).is_empty());
        assert_eq!(
            debouncer.take_due(start + Duration::from_millis(3500)),
            vec![("cdd-trusts", 3)]
        );
        assert_eq!(debouncer.pending_len(), 0);
    }

    #[test]
    fn keys_are_debounced_independently() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(2));
        debouncer.schedule("cdd-trusts", "a", start);
        debouncer.schedule("cdd-companies", "b", start + Duration::from_secs(1));
        debouncer.schedule("cdd-companies", "c", start + Duration::from_millis(1900));

        assert_eq!(
            debouncer.take_due(start + Duration::from_secs(2)),
            vec![("cdd-trusts", "a")]
        );
        assert_eq!(
            debouncer.next_due(),
            Some(start + Duration::from_millis(3900))
        );
        assert_eq!(debouncer.cancel(&"cdd-companies"), Some("c"));
        assert!(debouncer.take_due(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn feedback_is_written_once_after_quiet_period() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut autosave =
            FeedbackAutosave::new(FeedbackStore::new(dir.path()), &AutosaveConfig::default());
        let start = Instant::now();

        let mut feedback = FeedbackFile::new("cdd-individuals");
        feedback.notes.push("draft".into());
        autosave.record(feedback.clone(), start);
        feedback.notes[0] = "final".into();
        autosave.record(feedback, start + Duration::from_secs(1));

        assert!(autosave.flush_due(start + Duration::from_secs(2)).saved.is_empty());
        assert!(matches!(
            autosave.store().load("cdd-individuals"),
            FeedbackLoad::Absent
        ));

        let report = autosave.flush_due(start + Duration::from_secs(3));
        assert_eq!(report.saved.len(), 1);
        assert!(report.failed.is_empty());
        match autosave.store().load("cdd-individuals") {
            FeedbackLoad::Loaded(saved) => assert_eq!(saved.notes, vec!["final".to_string()]),
            other => panic!("unexpected load: {:?}", other),
        }
        assert!(!autosave.is_pending("cdd-individuals"));
    }
}

//! Bounded in-memory execution history.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::{HistoryConfig, MAX_AGE_CEILING_SECS};
use crate::domain::record::{ExecutionOutcome, ExecutionRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionLogConfig {
    pub capacity: usize,
    /// Records older than this are pruned. `None` keeps records until
    /// capacity pushes them out.
    pub max_age: Option<Duration>,
}

impl Default for ExecutionLogConfig {
    fn default() -> Self {
        Self { capacity: 100, max_age: None }
    }
}

impl From<&HistoryConfig> for ExecutionLogConfig {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            capacity: config.capacity,
            max_age: config
                .max_age_secs
                .map(|secs| Duration::seconds(secs.min(MAX_AGE_CEILING_SECS) as i64)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub by_outcome: BTreeMap<ExecutionOutcome, usize>,
}

struct LogState {
    records: VecDeque<ExecutionRecord>,
    next_id: u64,
}

pub struct ExecutionLog {
    config: ExecutionLogConfig,
    state: Mutex<LogState>,
}

impl ExecutionLog {
    pub fn new(config: ExecutionLogConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            config: ExecutionLogConfig { capacity, ..config },
            state: Mutex::new(LogState {
                records: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(ExecutionLogConfig { capacity, ..ExecutionLogConfig::default() })
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Stores `record` under the next id, evicting the oldest entries first
    /// when the log is full.
    pub fn append(&self, mut record: ExecutionRecord) -> ExecutionRecord {
        let mut state = self.lock();
        self.prune_expired(&mut state);

        record.id = state.next_id;
        state.next_id += 1;

        while state.records.len() >= self.config.capacity {
            state.records.pop_front();
        }
        state.records.push_back(record.clone());
        record
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let mut state = self.lock();
        self.prune_expired(&mut state);
        state.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<ExecutionRecord> {
        self.lock().records.iter().find(|record| record.id == id).cloned()
    }

    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.records.len();
        state.records.clear();
        info!(event_name = "history.cleared", removed, "execution history cleared");
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn outcome_counts(&self) -> ExecutionStats {
        let mut state = self.lock();
        self.prune_expired(&mut state);

        let mut by_outcome: BTreeMap<ExecutionOutcome, usize> =
            ExecutionOutcome::ALL.into_iter().map(|outcome| (outcome, 0)).collect();
        for record in &state.records {
            *by_outcome.entry(record.outcome).or_default() += 1;
        }
        ExecutionStats { total: state.records.len(), by_outcome }
    }

    fn prune_expired(&self, state: &mut LogState) {
        let Some(max_age) = self.config.max_age else {
            return;
        };
        let cutoff = Utc::now() - max_age;
        while state.records.front().is_some_and(|record| record.recorded_at < cutoff) {
            state.records.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new(ExecutionLogConfig::default())
    }
}

//! Learning logger and behavior pattern miner
//!
//! The logger records one row per completed turn. The miner is a periodic
//! cooperative sweep (never in the request path): it extracts a signal per
//! log, groups by `(pattern_type, signal)`, and folds the groups into
//! `behavior_patterns` rows, advancing `last_seen` and `frequency`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use renum_core::{
    new_entity_id, AgentId, BehaviorPattern, InteractionLog, PatternType, RenumResult,
    StorageError, Timestamp, TurnOutcome,
};
use std::collections::HashMap;
use std::sync::RwLock;

// ============================================================================
// LEARNING STORE TRAIT
// ============================================================================

/// Storage abstraction for interaction logs and mined behavior patterns.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Record one completed turn.
    async fn record(&self, log: InteractionLog) -> RenumResult<()>;

    /// Logs for an agent recorded at or after `since`, oldest first.
    async fn logs_since(&self, agent_id: AgentId, since: Timestamp)
        -> RenumResult<Vec<InteractionLog>>;

    /// Mined patterns for an agent in stable order (known categories first,
    /// observed categories after, each alphabetical by signal).
    async fn patterns(&self, agent_id: AgentId) -> RenumResult<Vec<BehaviorPattern>>;

    /// Insert or fold one mined group into the pattern table.
    async fn upsert_pattern(
        &self,
        agent_id: AgentId,
        pattern_type: PatternType,
        signal: &str,
        occurrences: i64,
        first_seen: Timestamp,
        last_seen: Timestamp,
    ) -> RenumResult<()>;
}

// ============================================================================
// SIGNAL EXTRACTION
// ============================================================================

/// Extract the behavior signal from one interaction log.
///
/// The categories are open: anything matching no heuristic lands in
/// `Other("statement")` so unknown shapes still aggregate instead of being
/// dropped.
pub fn extract_signal(log: &InteractionLog) -> (PatternType, String) {
    if log.outcome == TurnOutcome::Failed {
        return (PatternType::Error, "turn_failed".to_string());
    }

    let text = log.user_excerpt.to_lowercase();

    const HANDOFF_MARKERS: [&str; 6] = [
        "falar com atendente",
        "falar com humano",
        "human agent",
        "real person",
        "atendente",
        "transferir",
    ];
    const COMPLAINT_MARKERS: [&str; 8] = [
        "reclama",
        "problema",
        "não funciona",
        "nao funciona",
        "complaint",
        "broken",
        "wrong",
        "not working",
    ];
    const CONFIRMATION_MARKERS: [&str; 6] =
        ["confirmo", "confirmado", "pode ser", "yes please", "that works", "confirmed"];

    for marker in HANDOFF_MARKERS {
        if text.contains(marker) {
            return (PatternType::Handoff, marker.replace(' ', "_"));
        }
    }
    for marker in COMPLAINT_MARKERS {
        if text.contains(marker) {
            return (PatternType::Complaint, marker.replace(' ', "_"));
        }
    }
    for marker in CONFIRMATION_MARKERS {
        if text.contains(marker) {
            return (PatternType::Confirmation, marker.replace(' ', "_"));
        }
    }
    if text.contains('?') {
        return (PatternType::Question, "question_mark".to_string());
    }
    (PatternType::Other("statement".to_string()), "statement".to_string())
}

// ============================================================================
// PATTERN MINER
// ============================================================================

/// Periodic miner over interaction logs.
///
/// Single-instance by design: the watermark per agent lives in the miner, so
/// one sweep never double-counts a log. Runs outside the request path.
pub struct PatternMiner {
    watermarks: RwLock<HashMap<AgentId, Timestamp>>,
}

impl PatternMiner {
    pub fn new() -> Self {
        Self {
            watermarks: RwLock::new(HashMap::new()),
        }
    }

    /// Sweep one agent's unmined logs into behavior patterns.
    /// Returns the number of logs folded.
    pub async fn sweep(&self, store: &dyn LearningStore, agent_id: AgentId) -> RenumResult<usize> {
        let since = {
            let marks = self.watermarks.read().map_err(|_| StorageError::LockPoisoned)?;
            marks
                .get(&agent_id)
                .copied()
                .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC)
        };

        let logs = store.logs_since(agent_id, since).await?;
        if logs.is_empty() {
            return Ok(0);
        }

        // Group by (pattern_type, signal), tracking occurrence window.
        let mut groups: HashMap<(PatternType, String), (i64, Timestamp, Timestamp)> =
            HashMap::new();
        let mut newest = since;
        for log in &logs {
            let (pattern_type, signal) = extract_signal(log);
            let entry = groups
                .entry((pattern_type, signal))
                .or_insert((0, log.created_at, log.created_at));
            entry.0 += 1;
            entry.1 = entry.1.min(log.created_at);
            entry.2 = entry.2.max(log.created_at);
            newest = newest.max(log.created_at);
        }

        for ((pattern_type, signal), (count, first_seen, last_seen)) in groups {
            store
                .upsert_pattern(agent_id, pattern_type, &signal, count, first_seen, last_seen)
                .await?;
        }

        // Advance past the newest mined log so the next sweep starts fresh.
        let next_watermark = newest + chrono::Duration::microseconds(1);
        self.watermarks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(agent_id, next_watermark);

        tracing::debug!(agent_id = %agent_id, mined = logs.len(), "Pattern sweep complete");
        Ok(logs.len())
    }
}

impl Default for PatternMiner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Default)]
struct LearningState {
    logs: Vec<InteractionLog>,
    patterns: Vec<BehaviorPattern>,
}

/// RwLock-backed learning store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryLearningStore {
    state: RwLock<LearningState>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningStore for InMemoryLearningStore {
    async fn record(&self, log: InteractionLog) -> RenumResult<()> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.logs.push(log);
        Ok(())
    }

    async fn logs_since(
        &self,
        agent_id: AgentId,
        since: Timestamp,
    ) -> RenumResult<Vec<InteractionLog>> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut logs: Vec<_> = state
            .logs
            .iter()
            .filter(|l| l.agent_id == agent_id && l.created_at >= since)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    async fn patterns(&self, agent_id: AgentId) -> RenumResult<Vec<BehaviorPattern>> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut patterns: Vec<_> = state
            .patterns
            .iter()
            .filter(|p| p.agent_id == agent_id)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| {
            let (ar, asig) = a.pattern_type.sort_rank();
            let (br, bsig) = b.pattern_type.sort_rank();
            (ar, asig, a.signal.as_str()).cmp(&(br, bsig, b.signal.as_str()))
        });
        Ok(patterns)
    }

    async fn upsert_pattern(
        &self,
        agent_id: AgentId,
        pattern_type: PatternType,
        signal: &str,
        occurrences: i64,
        first_seen: Timestamp,
        last_seen: Timestamp,
    ) -> RenumResult<()> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(existing) = state
            .patterns
            .iter_mut()
            .find(|p| p.agent_id == agent_id && p.pattern_type == pattern_type && p.signal == signal)
        {
            existing.frequency += occurrences;
            existing.first_seen = existing.first_seen.min(first_seen);
            existing.last_seen = existing.last_seen.max(last_seen);
        } else {
            state.patterns.push(BehaviorPattern {
                pattern_id: new_entity_id(),
                agent_id,
                pattern_type,
                signal: signal.to_string(),
                frequency: occurrences,
                first_seen,
                last_seen,
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(agent_id: AgentId, user_text: &str, outcome: TurnOutcome) -> InteractionLog {
        InteractionLog::from_turn(
            agent_id,
            new_entity_id(),
            user_text,
            "reply",
            vec![],
            10,
            outcome,
        )
    }

    #[test]
    fn test_extract_signal_question() {
        let log = log_with(new_entity_id(), "how do you contact me?", TurnOutcome::Completed);
        let (pattern, signal) = extract_signal(&log);
        assert_eq!(pattern, PatternType::Question);
        assert_eq!(signal, "question_mark");
    }

    #[test]
    fn test_extract_signal_complaint_and_handoff() {
        let complaint = log_with(new_entity_id(), "isso não funciona", TurnOutcome::Completed);
        assert_eq!(extract_signal(&complaint).0, PatternType::Complaint);

        let handoff = log_with(
            new_entity_id(),
            "quero falar com atendente agora",
            TurnOutcome::Completed,
        );
        assert_eq!(extract_signal(&handoff).0, PatternType::Handoff);
    }

    #[test]
    fn test_extract_signal_failed_turn_is_error() {
        let log = log_with(new_entity_id(), "anything?", TurnOutcome::Failed);
        assert_eq!(extract_signal(&log).0, PatternType::Error);
    }

    #[test]
    fn test_extract_signal_fallback_is_open() {
        let log = log_with(new_entity_id(), "shipping to Lisbon", TurnOutcome::Completed);
        let (pattern, _) = extract_signal(&log);
        assert_eq!(pattern, PatternType::Other("statement".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_groups_and_counts() {
        let store = InMemoryLearningStore::new();
        let miner = PatternMiner::new();
        let agent = new_entity_id();

        for _ in 0..3 {
            store
                .record(log_with(agent, "where is my order?", TurnOutcome::Completed))
                .await
                .unwrap();
        }
        store
            .record(log_with(agent, "produto com problema", TurnOutcome::Completed))
            .await
            .unwrap();

        let mined = miner.sweep(&store, agent).await.unwrap();
        assert_eq!(mined, 4);

        let patterns = store.patterns(agent).await.unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].pattern_type, PatternType::Question);
        assert_eq!(patterns[0].frequency, 3);
        assert_eq!(patterns[1].pattern_type, PatternType::Complaint);
        assert_eq!(patterns[1].frequency, 1);
    }

    #[tokio::test]
    async fn test_sweep_does_not_double_count() {
        let store = InMemoryLearningStore::new();
        let miner = PatternMiner::new();
        let agent = new_entity_id();

        store
            .record(log_with(agent, "any update?", TurnOutcome::Completed))
            .await
            .unwrap();
        miner.sweep(&store, agent).await.unwrap();
        let second = miner.sweep(&store, agent).await.unwrap();
        assert_eq!(second, 0);

        let patterns = store.patterns(agent).await.unwrap();
        assert_eq!(patterns[0].frequency, 1);
    }

    #[tokio::test]
    async fn test_sweep_advances_last_seen() {
        let store = InMemoryLearningStore::new();
        let miner = PatternMiner::new();
        let agent = new_entity_id();

        store
            .record(log_with(agent, "first question?", TurnOutcome::Completed))
            .await
            .unwrap();
        miner.sweep(&store, agent).await.unwrap();
        let before = store.patterns(agent).await.unwrap()[0].last_seen;

        store
            .record(log_with(agent, "second question?", TurnOutcome::Completed))
            .await
            .unwrap();
        miner.sweep(&store, agent).await.unwrap();

        let after = &store.patterns(agent).await.unwrap()[0];
        assert_eq!(after.frequency, 2);
        assert!(after.last_seen >= before);
    }

    #[tokio::test]
    async fn test_patterns_are_stably_ordered() {
        let store = InMemoryLearningStore::new();
        let miner = PatternMiner::new();
        let agent = new_entity_id();

        store
            .record(log_with(agent, "plain statement", TurnOutcome::Completed))
            .await
            .unwrap();
        store
            .record(log_with(agent, "why though?", TurnOutcome::Completed))
            .await
            .unwrap();
        miner.sweep(&store, agent).await.unwrap();

        let patterns = store.patterns(agent).await.unwrap();
        // Known categories come before observed ones.
        assert_eq!(patterns[0].pattern_type, PatternType::Question);
        assert!(matches!(patterns[1].pattern_type, PatternType::Other(_)));
    }
}

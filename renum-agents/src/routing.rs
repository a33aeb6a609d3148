//! Sub-agent routing policy
//!
//! Sticky by default: a conversation keeps its assigned sub-agent unless the
//! routing signal demands a handoff or an admin override points elsewhere.
//! Otherwise candidates are scored by keyword overlap with the message
//! content and affinity with the agent's most recent behavior pattern;
//! the highest score wins, ties broken by sub-agent creation order.

use renum_core::{BehaviorPattern, Conversation, SubAgent, SubAgentId};
use std::collections::HashSet;

/// Weight of one keyword hit in the candidate score.
const KEYWORD_WEIGHT: i64 = 3;

/// Weight of matching the most recent behavior pattern.
const PATTERN_AFFINITY_WEIGHT: i64 = 2;

/// The routing signal derived from one inbound message.
#[derive(Debug, Clone, Default)]
pub struct RoutingSignal {
    /// Explicit admin override: always wins when the target exists.
    pub admin_override: Option<SubAgentId>,
    /// The message asked for a handoff, forcing rescoring.
    pub requests_handoff: bool,
}

/// Whether message content asks to leave the current sub-agent.
pub fn detect_handoff(content: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "falar com atendente",
        "falar com humano",
        "outro agente",
        "human agent",
        "real person",
        "transferir",
    ];
    let lowered = content.to_lowercase();
    MARKERS.iter().any(|m| lowered.contains(m))
}

/// Select the sub-agent for this turn.
///
/// Returns `None` when there are no candidates; the parent agent then
/// handles the turn itself.
pub fn select_sub_agent(
    conversation: &Conversation,
    candidates: &[SubAgent],
    patterns: &[BehaviorPattern],
    content: &str,
    signal: &RoutingSignal,
) -> Option<SubAgentId> {
    if candidates.is_empty() {
        return None;
    }

    // Admin override wins outright when it names a real candidate.
    if let Some(wanted) = signal.admin_override {
        if candidates.iter().any(|c| c.sub_agent_id == wanted) {
            return Some(wanted);
        }
    }

    // Sticky assignment unless the signal demands a handoff.
    if let Some(assigned) = conversation.assigned_sub_agent_id {
        if !signal.requests_handoff && candidates.iter().any(|c| c.sub_agent_id == assigned) {
            return Some(assigned);
        }
    }

    let content_tokens = tokenize(content);
    let last_pattern = patterns.iter().max_by_key(|p| p.last_seen);

    let mut best: Option<(&SubAgent, i64)> = None;
    for candidate in candidates {
        let score = score_candidate(candidate, &content_tokens, last_pattern);
        let better = match best {
            None => true,
            // Strict comparison keeps the earliest-created candidate on ties:
            // candidates arrive in creation order.
            Some((_, best_score)) => score > best_score,
        };
        if better {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, _)| candidate.sub_agent_id)
}

fn score_candidate(
    candidate: &SubAgent,
    content_tokens: &HashSet<String>,
    last_pattern: Option<&BehaviorPattern>,
) -> i64 {
    let candidate_keywords: HashSet<String> = if candidate.keywords.is_empty() {
        tokenize(&candidate.name)
    } else {
        candidate
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect()
    };

    let overlap = candidate_keywords
        .iter()
        .filter(|k| content_tokens.contains(*k))
        .count() as i64;
    let mut score = overlap * KEYWORD_WEIGHT;

    if let Some(pattern) = last_pattern {
        let type_name = pattern.pattern_type.as_db_str().to_lowercase();
        if candidate_keywords.contains(&type_name)
            || candidate_keywords.contains(&pattern.signal.to_lowercase())
        {
            score += PATTERN_AFFINITY_WEIGHT;
        }
    }

    score
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use renum_core::{new_entity_id, Channel, ConversationStatus, PatternType};

    fn conversation(assigned: Option<SubAgentId>) -> Conversation {
        Conversation {
            conversation_id: new_entity_id(),
            tenant_id: new_entity_id(),
            agent_id: new_entity_id(),
            external_user: None,
            channel: Channel::Web,
            status: ConversationStatus::Active,
            priority: 0,
            tags: vec![],
            unread_count: 0,
            assigned_sub_agent_id: assigned,
            last_update: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn sub_agent(name: &str, keywords: &[&str], created_offset_secs: i64) -> SubAgent {
        SubAgent {
            sub_agent_id: new_entity_id(),
            parent_agent_id: new_entity_id(),
            name: name.to_string(),
            system_prompt: format!("You are {}.", name),
            allowed_tools: vec![],
            rag_document_ids: vec![],
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
        }
    }

    #[test]
    fn test_sticky_assignment_wins_without_handoff() {
        let billing = sub_agent("Billing", &["fatura", "boleto"], 0);
        let support = sub_agent("Support", &["erro", "problema"], 1);
        let convo = conversation(Some(support.sub_agent_id));

        let chosen = select_sub_agent(
            &convo,
            &[billing, support.clone()],
            &[],
            "minha fatura chegou errada",
            &RoutingSignal::default(),
        );
        assert_eq!(chosen, Some(support.sub_agent_id));
    }

    #[test]
    fn test_handoff_forces_rescoring() {
        let billing = sub_agent("Billing", &["fatura", "boleto"], 0);
        let support = sub_agent("Support", &["erro", "problema"], 1);
        let convo = conversation(Some(support.sub_agent_id));

        let chosen = select_sub_agent(
            &convo,
            &[billing.clone(), support],
            &[],
            "quero transferir, minha fatura está errada",
            &RoutingSignal {
                requests_handoff: true,
                ..Default::default()
            },
        );
        assert_eq!(chosen, Some(billing.sub_agent_id));
    }

    #[test]
    fn test_keyword_overlap_picks_best_candidate() {
        let billing = sub_agent("Billing", &["fatura", "boleto", "pagamento"], 0);
        let support = sub_agent("Support", &["erro", "bug"], 1);
        let convo = conversation(None);

        let chosen = select_sub_agent(
            &convo,
            &[billing.clone(), support],
            &[],
            "não recebi o boleto do pagamento",
            &RoutingSignal::default(),
        );
        assert_eq!(chosen, Some(billing.sub_agent_id));
    }

    #[test]
    fn test_tie_breaks_by_creation_order() {
        let first = sub_agent("Alpha", &["vendas"], 0);
        let second = sub_agent("Beta", &["vendas"], 5);
        let convo = conversation(None);

        let chosen = select_sub_agent(
            &convo,
            &[first.clone(), second],
            &[],
            "quero falar de vendas",
            &RoutingSignal::default(),
        );
        assert_eq!(chosen, Some(first.sub_agent_id));
    }

    #[test]
    fn test_admin_override_wins() {
        let billing = sub_agent("Billing", &["fatura"], 0);
        let support = sub_agent("Support", &["erro"], 1);
        let convo = conversation(Some(billing.sub_agent_id));

        let chosen = select_sub_agent(
            &convo,
            &[billing, support.clone()],
            &[],
            "minha fatura está errada",
            &RoutingSignal {
                admin_override: Some(support.sub_agent_id),
                ..Default::default()
            },
        );
        assert_eq!(chosen, Some(support.sub_agent_id));
    }

    #[test]
    fn test_pattern_affinity_breaks_keyword_tie() {
        let generic = sub_agent("Generic", &["pedido"], 0);
        let complaints = sub_agent("Complaints", &["pedido", "complaint"], 5);
        let convo = conversation(None);

        let pattern = BehaviorPattern {
            pattern_id: new_entity_id(),
            agent_id: convo.agent_id,
            pattern_type: PatternType::Complaint,
            signal: "problema".to_string(),
            frequency: 4,
            first_seen: Utc::now() - Duration::hours(2),
            last_seen: Utc::now(),
        };

        let chosen = select_sub_agent(
            &convo,
            &[generic, complaints.clone()],
            &[pattern],
            "sobre meu pedido",
            &RoutingSignal::default(),
        );
        assert_eq!(chosen, Some(complaints.sub_agent_id));
    }

    #[test]
    fn test_no_candidates_returns_none() {
        let convo = conversation(None);
        assert_eq!(
            select_sub_agent(&convo, &[], &[], "anything", &RoutingSignal::default()),
            None
        );
    }

    #[test]
    fn test_detect_handoff() {
        assert!(detect_handoff("Quero falar com atendente"));
        assert!(detect_handoff("can I talk to a REAL PERSON please"));
        assert!(!detect_handoff("qual o status do pedido?"));
    }
}

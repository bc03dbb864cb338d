//! Conversation window assembly from the local mirror.

use thoughtchain_engine::{ConversationWindow, GenerationEngine};
use tracing::warn;

use crate::error::AgentError;
use crate::ledger::narrow;
use crate::store::Mirror;

/// User turn asking for entry `index`.
pub fn entry_prompt(index: u64) -> String {
    format!(
        "Produce thought/interaction/inner monologue number {}, remember to account for \
         previous interactions and roleplay the character. Proceed right to roleplay \
         without elaboration.",
        index
    )
}

/// First index shown in a window of `size` entries ending at `cursor`.
pub fn window_start(cursor: u64, size: u64) -> u64 {
    cursor.saturating_sub(size.saturating_sub(1))
}

/// Build the window for cursor `cursor`.
///
/// Covers `window_start(cursor, size)..=cursor`; indices without a record,
/// and records holding words outside the engine vocabulary, are skipped.
/// Ends with the unanswered prompt for `cursor + 1`.
pub async fn build_window(
    mirror: &Mirror<'_>,
    engine: &dyn GenerationEngine,
    system_prompt: &str,
    cursor: u64,
    size: u64,
) -> Result<ConversationWindow, AgentError> {
    let mut window = ConversationWindow::with_system(system_prompt);

    for index in window_start(cursor, size)..=cursor {
        let Some(words) = mirror.record(index)? else {
            continue;
        };
        let Some(tokens) = narrow(&words) else {
            warn!(index, "Record has tokens outside the engine vocabulary, leaving it out");
            continue;
        };
        let text = engine.detokenize(&tokens).await?;
        window.push_exchange(entry_prompt(index), text);
    }

    window.push_prompt(entry_prompt(cursor + 1));
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::widen;
    use crate::store::MemoryStore;
    use alloy_primitives::U256;
    use thoughtchain_engine::{MockEngine, Role};

    async fn tokens(engine: &MockEngine, text: &str) -> Vec<U256> {
        widen(&engine.tokenize(text).await.unwrap())
    }

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(0, 6), 0);
        assert_eq!(window_start(3, 6), 0);
        assert_eq!(window_start(5, 6), 0);
        assert_eq!(window_start(10, 6), 5);
        assert_eq!(window_start(10, 1), 10);
    }

    #[tokio::test]
    async fn test_fresh_store_window() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);
        mirror.initialize().unwrap();
        let engine = MockEngine::default();

        let window = build_window(&mirror, &engine, "persona", 0, 6).await.unwrap();

        assert_eq!(window.system_prompt.as_deref(), Some("persona"));
        assert_eq!(window.answered(), 1);
        assert_eq!(window.turns[1].content, "");
        assert_eq!(window.pending_prompt(), Some(entry_prompt(1).as_str()));
    }

    #[tokio::test]
    async fn test_window_is_bounded_to_six_entries() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);
        mirror.initialize().unwrap();
        let engine = MockEngine::default();
        for i in 1..=10u64 {
            mirror.advance(i, &tokens(&engine, &format!("entry {}", i)).await).unwrap();
        }

        let window = build_window(&mirror, &engine, "persona", 10, 6).await.unwrap();

        assert_eq!(window.answered(), 6);
        let answers: Vec<&str> = window
            .turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(answers, ["entry 5", "entry 6", "entry 7", "entry 8", "entry 9", "entry 10"]);
        assert_eq!(window.turns[0].content, entry_prompt(5));
        assert_eq!(window.pending_prompt(), Some(entry_prompt(11).as_str()));
    }

    #[tokio::test]
    async fn test_missing_records_are_skipped() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);
        mirror.initialize().unwrap();
        let engine = MockEngine::default();
        mirror.put_record(2, &tokens(&engine, "two").await).unwrap();
        mirror.put_record(4, &tokens(&engine, "four").await).unwrap();

        let window = build_window(&mirror, &engine, "persona", 4, 6).await.unwrap();

        // records 0, 2 and 4; 1 and 3 are absent
        assert_eq!(window.answered(), 3);
        assert_eq!(window.turns.len(), 7);
        assert!(window.turns.iter().all(|t| t.content != entry_prompt(1)));
    }

    #[tokio::test]
    async fn test_record_outside_vocabulary_is_skipped() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);
        mirror.initialize().unwrap();
        let engine = MockEngine::default();
        mirror.advance(1, &[U256::from(1u64 << 32)]).unwrap();
        mirror.advance(2, &tokens(&engine, "two").await).unwrap();

        let window = build_window(&mirror, &engine, "persona", 2, 6).await.unwrap();

        assert_eq!(window.answered(), 2);
        assert!(window.turns.iter().all(|t| t.content != entry_prompt(1)));
        assert_eq!(window.pending_prompt(), Some(entry_prompt(3).as_str()));
    }
}

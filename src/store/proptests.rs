//! Property-based tests for load ordering
//!
//! Overlapping loads may complete in any order; the store must always end up
//! holding the result of the most recent request.

use super::*;
use crate::testing::MockChatBackend;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_conversation_id() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(str::to_string)
}

/// Conversation ids to load, and the order their responses arrive in
fn arb_load_race() -> impl Strategy<Value = (Vec<String>, Vec<usize>)> {
    proptest::collection::vec(arb_conversation_id(), 1..6).prop_flat_map(|ids| {
        let order: Vec<usize> = (0..ids.len()).collect();
        (Just(ids), Just(order).prop_shuffle())
    })
}

fn response_for(call: usize, conversation_id: &str) -> Vec<Message> {
    vec![Message::assistant(
        format!("{conversation_id}-{call}"),
        format!("history of {conversation_id}"),
    )]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Issue every load, then let responses arrive in `order`
async fn race(ids: &[String], order: &[usize]) -> (Arc<ConversationStore>, Vec<LoadOutcome>) {
    let backend = Arc::new(MockChatBackend::new());
    backend.hold_messages();
    let store = Arc::new(ConversationStore::new(backend.clone()));

    let mut tasks = Vec::new();
    for (call, id) in ids.iter().enumerate() {
        backend.queue_messages(Ok(response_for(call, id)));
        let store = store.clone();
        let id = id.clone();
        tasks.push(Some(tokio::spawn(async move { store.load_messages(&id).await })));
        backend.wait_for_message_calls(call + 1).await;
    }

    let mut outcomes = vec![LoadOutcome::Discarded; ids.len()];
    for &call in order {
        backend.release_messages(call);
        let task = tasks[call].take().unwrap();
        outcomes[call] = task.await.unwrap().unwrap();
    }
    (store, outcomes)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Whatever order responses arrive in, the last request's result is what
    /// the store holds
    #[test]
    fn prop_last_request_wins((ids, order) in arb_load_race()) {
        let (store, outcomes) = runtime().block_on(race(&ids, &order));

        let last = ids.len() - 1;
        prop_assert_eq!(store.active_conversation_id(), Some(ids[last].clone()));
        let held: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        prop_assert_eq!(held, vec![format!("{}-{last}", ids[last])]);
        prop_assert!(!store.is_loading());

        // Exactly one result is applied: the last request's
        for (call, outcome) in outcomes.iter().enumerate() {
            let expected = if call == last { LoadOutcome::Applied } else { LoadOutcome::Discarded };
            prop_assert_eq!(*outcome, expected);
        }
    }

    /// A purge in the middle of a race drops every result
    #[test]
    fn prop_clear_discards_all_inflight((ids, order) in arb_load_race()) {
        let outcomes = runtime().block_on(async {
            let backend = Arc::new(MockChatBackend::new());
            backend.hold_messages();
            let store = Arc::new(ConversationStore::new(backend.clone()));

            let mut tasks = Vec::new();
            for (call, id) in ids.iter().enumerate() {
                backend.queue_messages(Ok(response_for(call, id)));
                let store = store.clone();
                let id = id.clone();
                tasks.push(Some(tokio::spawn(async move { store.load_messages(&id).await })));
                backend.wait_for_message_calls(call + 1).await;
            }
            store.clear();

            let mut outcomes = Vec::new();
            for &call in &order {
                backend.release_messages(call);
                outcomes.push(tasks[call].take().unwrap().await.unwrap().unwrap());
            }
            assert!(store.messages().is_empty());
            assert!(store.active_conversation_id().is_none());
            outcomes
        });

        prop_assert!(outcomes.iter().all(|o| *o == LoadOutcome::Discarded));
    }
}

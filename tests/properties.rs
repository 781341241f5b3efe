//! Property tests for the log and the sequence cursor.

use ballbyball::{
    Admission, CommentaryInput, EventType, NewMatch, SequenceCursor, Store, StoreError,
};
use proptest::prelude::*;

fn event_type() -> impl Strategy<Value = &'static str> {
    prop::sample::select(EventType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>())
}

fn submission() -> impl Strategy<Value = CommentaryInput> {
    (1i64..50, 1i64..7, event_type(), 0i64..7, "[a-z ]{0,12}").prop_map(
        |(over, ball, kind, runs, description)| {
            CommentaryInput::new(over, ball, kind, runs, description)
        },
    )
}

proptest! {
    #[test]
    fn accepted_events_form_a_gapless_prefix(inputs in prop::collection::vec(submission(), 0..40)) {
        let store = Store::in_memory();
        let id = store.create_match(NewMatch::new("India", "Australia", "MCG")).unwrap().match_id;

        let mut accepted = Vec::new();
        for input in inputs {
            let blank = input.description.trim().is_empty();
            match store.submit(id, input) {
                Ok(event) => {
                    prop_assert!(!blank);
                    accepted.push(event);
                }
                Err(StoreError::Validation(_)) => prop_assert!(blank),
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }

        let stored = store.read_all(id).unwrap();
        prop_assert_eq!(&stored, &accepted);
        for (i, event) in stored.iter().enumerate() {
            prop_assert_eq!(event.sequence.0, i as u64);
        }
    }

    #[test]
    fn cursor_admits_each_event_once(total in 1usize..30, replay_from in 0usize..30) {
        let store = Store::in_memory();
        let id = store.create_match(NewMatch::new("India", "Australia", "MCG")).unwrap().match_id;
        for ball in 0..total {
            store
                .submit(id, CommentaryInput::new(1, (ball % 6 + 1) as i64, "run", 1, "single"))
                .unwrap();
        }
        let events = store.read_all(id).unwrap();

        // Snapshot covers a prefix; pushes replay from an earlier point.
        let split = replay_from.min(total);
        let mut cursor = SequenceCursor::new(split.checked_sub(1).map(|i| events[i].sequence));
        let mut fresh = 0;
        for event in events.iter().skip(split.saturating_sub(3)) {
            match cursor.admit(event) {
                Admission::Fresh => fresh += 1,
                Admission::Duplicate => {}
                Admission::Gap { .. } => prop_assert!(false, "no gap expected"),
            }
        }
        prop_assert_eq!(fresh, total - split);
    }
}

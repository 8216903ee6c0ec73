//! Tests for the stream ingestion state machine

use super::*;
use proptest::prelude::*;

fn suggestion(word: &str) -> StreamEvent {
    StreamEvent::Suggestion {
        data: KeywordSuggestion::new(word),
    }
}

fn complete(total: u64) -> StreamEvent {
    StreamEvent::Complete {
        total,
        session_id: None,
    }
}

fn started() -> StreamIngestor {
    let mut ingestor = StreamIngestor::new();
    assert!(ingestor.start());
    ingestor
}

fn words(ingestor: &StreamIngestor) -> Vec<&str> {
    ingestor.suggestions().iter().map(|s| s.word.as_str()).collect()
}

#[test]
fn test_start_only_from_idle() {
    let mut ingestor = StreamIngestor::new();
    assert_eq!(ingestor.state(), &StreamState::Idle);
    assert!(ingestor.start());
    assert_eq!(ingestor.state(), &StreamState::Connecting);
    assert!(!ingestor.start());
}

#[test]
fn test_events_before_start_are_ignored() {
    let mut ingestor = StreamIngestor::new();
    assert_eq!(ingestor.handle_event(suggestion("rain")), IngestUpdate::Ignored);
    assert!(ingestor.suggestions().is_empty());
}

#[test]
fn test_first_frame_moves_to_streaming() {
    let mut ingestor = started();
    ingestor.handle_event(StreamEvent::Status { session_id: None });
    assert_eq!(ingestor.state(), &StreamState::Streaming);
}

#[test]
fn test_suggestions_keep_arrival_order() {
    let mut ingestor = started();
    assert_eq!(ingestor.handle_event(suggestion("thunder")), IngestUpdate::Suggestion(0));
    assert_eq!(ingestor.handle_event(suggestion("lightning")), IngestUpdate::Suggestion(1));
    assert_eq!(ingestor.handle_event(suggestion("hail")), IngestUpdate::Suggestion(2));
    assert_eq!(words(&ingestor), vec!["thunder", "lightning", "hail"]);
}

#[test]
fn test_ill_formed_suggestions_are_dropped() {
    let mut ingestor = started();
    ingestor.handle_event(suggestion("  "));
    ingestor.handle_event(suggestion("I'm sorry, I cannot help with that"));
    ingestor.handle_event(suggestion(&"x".repeat(101)));
    ingestor.handle_event(suggestion("fog"));
    assert_eq!(words(&ingestor), vec!["fog"]);
}

#[test]
fn test_first_session_id_wins() {
    let mut ingestor = started();
    let first = ingestor.handle_event(StreamEvent::Status {
        session_id: Some("s-1".to_string()),
    });
    assert_eq!(first, IngestUpdate::SessionId("s-1".to_string()));

    let second = ingestor.handle_event(StreamEvent::Status {
        session_id: Some("s-2".to_string()),
    });
    assert_eq!(second, IngestUpdate::Ignored);
    assert_eq!(ingestor.session_id(), Some("s-1"));
}

#[test]
fn test_session_id_from_complete_when_status_had_none() {
    let mut ingestor = started();
    ingestor.handle_event(StreamEvent::Status { session_id: None });
    ingestor.handle_event(StreamEvent::Complete {
        total: 0,
        session_id: Some("late".to_string()),
    });
    assert_eq!(ingestor.session_id(), Some("late"));
}

#[test]
fn test_complete_then_finish() {
    let mut ingestor = started();
    ingestor.handle_event(suggestion("rain"));
    assert_eq!(ingestor.handle_event(complete(1)), IngestUpdate::Completed { total: 1 });
    assert_eq!(ingestor.state(), &StreamState::Completing);
    assert_eq!(ingestor.total(), Some(1));

    assert!(ingestor.finish());
    assert_eq!(ingestor.state(), &StreamState::Complete);
    assert!(!ingestor.finish());
}

#[test]
fn test_error_frame_keeps_partials() {
    let mut ingestor = started();
    ingestor.handle_event(suggestion("rain"));
    let update = ingestor.handle_event(StreamEvent::Error {
        message: "overloaded".to_string(),
    });
    assert_eq!(update, IngestUpdate::Failed("overloaded".to_string()));
    assert_eq!(ingestor.state(), &StreamState::Errored("overloaded".to_string()));
    assert_eq!(words(&ingestor), vec!["rain"]);
}

#[test]
fn test_terminal_states_are_final() {
    let mut ingestor = started();
    ingestor.cancel();
    assert_eq!(ingestor.state(), &StreamState::Cancelled);

    assert_eq!(ingestor.handle_event(suggestion("late")), IngestUpdate::Ignored);
    assert_eq!(ingestor.fail("boom"), IngestUpdate::Ignored);
    assert_eq!(ingestor.end_of_stream(), IngestUpdate::Ignored);
    assert_eq!(ingestor.state(), &StreamState::Cancelled);
    assert!(ingestor.suggestions().is_empty());
}

#[test]
fn test_cancel_while_completing() {
    let mut ingestor = started();
    ingestor.handle_event(complete(0));
    assert_eq!(ingestor.cancel(), IngestUpdate::Cancelled);
    assert!(!ingestor.finish());
}

#[test]
fn test_end_of_stream_without_complete_is_error() {
    let mut ingestor = started();
    ingestor.handle_event(suggestion("rain"));
    assert_eq!(
        ingestor.end_of_stream(),
        IngestUpdate::Failed("stream ended before completion".to_string())
    );
}

#[test]
fn test_end_of_stream_after_complete_is_noop() {
    let mut ingestor = started();
    ingestor.handle_event(complete(0));
    assert_eq!(ingestor.end_of_stream(), IngestUpdate::Ignored);
    assert_eq!(ingestor.state(), &StreamState::Completing);
}

#[test]
fn test_continuing_appends_after_previous_batch() {
    let previous = vec![KeywordSuggestion::new("a"), KeywordSuggestion::new("b")];
    let mut ingestor = StreamIngestor::continuing(previous, Some("s-1".to_string()));
    ingestor.start();
    assert_eq!(ingestor.handle_event(suggestion("c")), IngestUpdate::Suggestion(2));

    assert_eq!(words(&ingestor), vec!["a", "b", "c"]);
    assert_eq!(ingestor.batch_start(), 2);
    assert_eq!(ingestor.new_items().len(), 1);
    assert_eq!(ingestor.session_id(), Some("s-1"));
}

#[test]
fn test_stagger_is_relative_to_batch_start() {
    let previous: Vec<KeywordSuggestion> =
        (0..100).map(|i| KeywordSuggestion::new(format!("w{}", i))).collect();
    let mut ingestor = StreamIngestor::continuing(previous, None);
    ingestor.start();
    ingestor.handle_event(suggestion("first"));
    ingestor.handle_event(suggestion("second"));

    assert_eq!(ingestor.batch_index(100), Some(0));
    assert_eq!(ingestor.batch_index(101), Some(1));
    assert_eq!(ingestor.batch_index(50), None);
    assert_eq!(ingestor.stagger_delay(100), Duration::ZERO);
    assert_eq!(ingestor.stagger_delay(101), STAGGER_STEP);
}

#[test]
fn test_from_cache_is_complete() {
    let ingestor = StreamIngestor::from_cache(vec![KeywordSuggestion::new("a")]);
    assert_eq!(ingestor.state(), &StreamState::Complete);
    assert_eq!(ingestor.progress(), 1);
}

proptest! {
    /// A continued attempt never disturbs the items it was seeded with
    #[test]
    fn prop_continuation_is_prefix_consistent(
        seeded in prop::collection::vec("[a-z]{1,8}", 0..30),
        arriving in prop::collection::vec("[a-z]{1,8}", 0..30),
    ) {
        let previous: Vec<KeywordSuggestion> =
            seeded.iter().map(|w| KeywordSuggestion::new(w.as_str())).collect();
        let mut ingestor = StreamIngestor::continuing(previous.clone(), None);
        ingestor.start();
        for word in &arriving {
            ingestor.handle_event(suggestion(word));
        }

        prop_assert_eq!(&ingestor.suggestions()[..previous.len()], previous.as_slice());
        prop_assert_eq!(ingestor.new_items().len(), arriving.len());
    }
}

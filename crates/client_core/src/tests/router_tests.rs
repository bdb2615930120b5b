use super::*;
use serde_json::json;
use shared::protocol::JoinCommand;

#[derive(Default)]
struct Counter {
    hits: Vec<Value>,
}

fn counting_router() -> EventRouter<Counter, usize> {
    let mut router = EventRouter::new();
    router.on_any(InboundEvent::TranscriptChunk, |state: &mut Counter, data: &Value| {
        state.hits.push(data.clone());
        state.hits.len()
    });
    router
}

#[test]
fn handler_fires_once_for_either_spelling() {
    let mut router = counting_router();
    let mut state = Counter::default();

    let (outcome, results) = router.dispatch(
        &mut state,
        &WireFrame::new("transcript:chunk", json!({ "text": "a" })),
    );
    assert_eq!(
        outcome,
        RouteOutcome::Dispatched {
            event: InboundEvent::TranscriptChunk,
            handlers: 1
        }
    );
    assert_eq!(results, vec![1]);

    router.dispatch(
        &mut state,
        &WireFrame::new("transcript_chunk", json!({ "text": "b" })),
    );
    assert_eq!(state.hits, vec![json!({ "text": "a" }), json!({ "text": "b" })]);
}

#[test]
fn mirrored_frame_under_other_spelling_is_dropped() {
    let mut router = counting_router();
    let mut state = Counter::default();
    let payload = json!({ "text": "hello", "ts": 1 });

    router.dispatch(&mut state, &WireFrame::new("transcript:chunk", payload.clone()));
    let (outcome, results) =
        router.dispatch(&mut state, &WireFrame::new("transcript_chunk", payload.clone()));

    assert_eq!(
        outcome,
        RouteOutcome::Mirror {
            event: InboundEvent::TranscriptChunk
        }
    );
    assert!(results.is_empty());
    assert_eq!(state.hits.len(), 1);

    // A genuine repeat after the mirror is a new message again.
    router.dispatch(&mut state, &WireFrame::new("transcript:chunk", payload));
    assert_eq!(state.hits.len(), 2);
}

#[test]
fn repeat_under_same_spelling_is_not_treated_as_mirror() {
    let mut router = counting_router();
    let mut state = Counter::default();
    let frame = WireFrame::new("transcript_chunk", json!({ "text": "again" }));

    router.dispatch(&mut state, &frame);
    router.dispatch(&mut state, &frame);
    assert_eq!(state.hits.len(), 2);
}

#[test]
fn different_payload_under_other_spelling_is_dispatched() {
    let mut router = counting_router();
    let mut state = Counter::default();

    router.dispatch(
        &mut state,
        &WireFrame::new("transcript:chunk", json!({ "text": "one" })),
    );
    router.dispatch(
        &mut state,
        &WireFrame::new("transcript_chunk", json!({ "text": "two" })),
    );
    assert_eq!(state.hits.len(), 2);
}

#[test]
fn unknown_and_unsubscribed_events_do_nothing() {
    let mut router = counting_router();
    let mut state = Counter::default();

    let (outcome, _) = router.dispatch(&mut state, &WireFrame::new("presence:update", json!({})));
    assert_eq!(outcome, RouteOutcome::Unknown);

    let (outcome, results) =
        router.dispatch(&mut state, &WireFrame::new("ai:token", json!({ "token": "x" })));
    assert_eq!(
        outcome,
        RouteOutcome::Dispatched {
            event: InboundEvent::AiToken,
            handlers: 0
        }
    );
    assert!(results.is_empty());
    assert!(state.hits.is_empty());
}

#[test]
fn off_and_clear_unregister_handlers() {
    let mut router = counting_router();
    let mut state = Counter::default();
    assert!(router.has_handlers(InboundEvent::TranscriptChunk));

    router.off(InboundEvent::TranscriptChunk);
    assert!(!router.has_handlers(InboundEvent::TranscriptChunk));
    router.dispatch(
        &mut state,
        &WireFrame::new("transcript:chunk", json!({ "text": "late" })),
    );
    assert!(state.hits.is_empty());

    let mut router = counting_router();
    router.clear();
    assert!(!router.has_handlers(InboundEvent::TranscriptChunk));
}

#[test]
fn emit_any_produces_one_frame_per_spelling() {
    let command = JoinCommand {
        session_id: shared::domain::SessionId::new("abc"),
        join_code: Some("1234".into()),
        device_type: "desktop".into(),
    };
    let frames = emit_any(OutboundCommand::Join, &command);

    let names: Vec<_> = frames.iter().map(|f| f.event.as_str()).collect();
    assert_eq!(names, vec!["session:join", "session_join"]);
    assert_eq!(frames[0].data, frames[1].data);
    assert_eq!(
        frames[0].data,
        json!({ "sessionId": "abc", "joinCode": "1234", "deviceType": "desktop" })
    );
}

use super::*;

fn token(text: &str) -> AiTokenPayload {
    AiTokenPayload {
        kind: None,
        token: text.to_string(),
        ts: None,
    }
}

fn response(kind: AiRequestKind, content: &str) -> AiResponsePayload {
    AiResponsePayload {
        kind: Some(kind),
        content: content.to_string(),
        ts: None,
    }
}

#[test]
fn response_overrides_token_concatenation() {
    let mut ai = TokenAggregator::new();
    ai.apply_status(AiStatus::Running, Some(AiRequestKind::HelpMe), 10);
    ai.push_token(&token("I "), 11);
    ai.push_token(&token("think "), 12);
    ai.push_token(&token("so."), 13);
    assert_eq!(ai.active().map(|m| m.content.as_str()), Some("I think so."));
    assert_eq!(ai.phase(), TurnPhase::Streaming);

    ai.finalize(&response(AiRequestKind::HelpMe, "I think so, definitely."), 14);

    assert_eq!(ai.messages().len(), 1);
    let message = &ai.messages()[0];
    assert_eq!(message.content, "I think so, definitely.");
    assert!(!message.streaming);
    assert_eq!(ai.streaming_count(), 0);
    assert_eq!(ai.phase(), TurnPhase::Finalized);
}

#[test]
fn running_opens_empty_streaming_entry_once() {
    let mut ai = TokenAggregator::new();
    assert_eq!(ai.phase(), TurnPhase::Idle);
    let first = ai.apply_status(AiStatus::Running, Some(AiRequestKind::Code), 1);
    let second = ai.apply_status(AiStatus::Running, Some(AiRequestKind::Code), 2);

    assert_eq!(first, second);
    assert_eq!(ai.messages().len(), 1);
    assert_eq!(ai.phase(), TurnPhase::Running);
    let active = ai.active().expect("active entry");
    assert!(active.streaming);
    assert!(active.content.is_empty());
    assert_eq!(active.kind, AiRequestKind::Code);
}

#[test]
fn token_without_running_creates_streaming_entry() {
    let mut ai = TokenAggregator::new();
    ai.push_token(
        &AiTokenPayload {
            kind: Some(AiRequestKind::Explain),
            token: "Hi".into(),
            ts: Some(500),
        },
        900,
    );

    let active = ai.active().expect("active entry");
    assert_eq!(active.kind, AiRequestKind::Explain);
    assert_eq!(active.timestamp, 500);
    assert!(active.streaming);
}

#[test]
fn token_refreshes_kind_and_timestamp_only_when_present() {
    let mut ai = TokenAggregator::new();
    ai.begin(AiRequestKind::HelpMe, 100);
    ai.push_token(&token("a"), 200);
    let active = ai.active().expect("active");
    assert_eq!(active.kind, AiRequestKind::HelpMe);
    assert_eq!(active.timestamp, 100);

    ai.push_token(
        &AiTokenPayload {
            kind: Some(AiRequestKind::Code),
            token: "b".into(),
            ts: Some(300),
        },
        400,
    );
    let active = ai.active().expect("active");
    assert_eq!(active.kind, AiRequestKind::Code);
    assert_eq!(active.timestamp, 300);
    assert_eq!(active.content, "ab");
}

#[test]
fn at_most_one_entry_streams_across_running_and_tokens() {
    let mut ai = TokenAggregator::new();
    ai.begin(AiRequestKind::HelpMe, 0);
    ai.push_token(&token("x"), 1);
    ai.begin(AiRequestKind::Explain, 2);
    ai.push_token(&token("y"), 3);
    ai.begin(AiRequestKind::Code, 4);

    assert_eq!(ai.streaming_count(), 1);
    assert_eq!(ai.messages().len(), 1);
    assert_eq!(ai.messages()[0].content, "xy");
}

#[test]
fn response_without_stream_appends_finalized_entry() {
    let mut ai = TokenAggregator::new();
    ai.finalize(&response(AiRequestKind::Code, "fn main() {}"), 7);
    ai.finalize(&response(AiRequestKind::HelpMe, "second"), 8);

    assert_eq!(ai.messages().len(), 2);
    assert!(ai.messages().iter().all(|m| !m.streaming));
    assert_eq!(ai.messages()[0].timestamp, 7);
    assert_eq!(ai.messages()[1].content, "second");
}

#[test]
fn empty_response_keeps_streamed_tokens() {
    let mut ai = TokenAggregator::new();
    ai.push_token(&token("partial answer"), 1);
    ai.finalize(&response(AiRequestKind::HelpMe, ""), 2);

    assert_eq!(ai.messages()[0].content, "partial answer");
    assert_eq!(ai.streaming_count(), 0);
}

#[test]
fn empty_response_without_stream_is_ignored() {
    let mut ai = TokenAggregator::new();
    assert_eq!(ai.finalize(&response(AiRequestKind::HelpMe, "  "), 2), None);
    assert!(ai.messages().is_empty());
}

#[test]
fn done_status_settles_entry_and_late_response_replaces_it() {
    let mut ai = TokenAggregator::new();
    ai.begin(AiRequestKind::HelpMe, 0);
    ai.push_token(&token("draft"), 1);
    let settled = ai.apply_status(AiStatus::Done, None, 2);

    assert_eq!(settled, Some(0));
    assert_eq!(ai.streaming_count(), 0);
    assert_eq!(ai.messages()[0].content, "draft");

    ai.finalize(&response(AiRequestKind::HelpMe, "final"), 3);
    assert_eq!(ai.messages().len(), 1);
    assert_eq!(ai.messages()[0].content, "final");
}

#[test]
fn next_turn_after_done_does_not_touch_previous_entry() {
    let mut ai = TokenAggregator::new();
    ai.begin(AiRequestKind::HelpMe, 0);
    ai.push_token(&token("first"), 1);
    ai.apply_status(AiStatus::Error, None, 2);
    ai.begin(AiRequestKind::HelpMe, 3);
    ai.finalize(&response(AiRequestKind::HelpMe, "second"), 4);

    let contents: Vec<_> = ai.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[test]
fn done_without_active_entry_is_a_no_op() {
    let mut ai = TokenAggregator::new();
    assert_eq!(ai.apply_status(AiStatus::Done, None, 0), None);
    assert_eq!(ai.apply_status(AiStatus::Unknown, None, 0), None);
    assert!(ai.messages().is_empty());
}

#[test]
fn empty_token_is_ignored() {
    let mut ai = TokenAggregator::new();
    assert_eq!(ai.push_token(&token(""), 0), None);
    assert!(ai.messages().is_empty());
}

#[test]
fn replace_history_clears_streaming_state() {
    let mut ai = TokenAggregator::new();
    ai.begin(AiRequestKind::HelpMe, 0);
    ai.replace_history(vec![AiMessage {
        kind: AiRequestKind::Code,
        content: "restored".into(),
        timestamp: 5,
        streaming: true,
    }]);

    assert!(ai.active().is_none());
    assert_eq!(ai.streaming_count(), 0);
    ai.push_token(&token("new"), 6);
    assert_eq!(ai.messages().len(), 2);
}

#[test]
fn response_without_type_keeps_streamed_kind() {
    let mut ai = TokenAggregator::new();
    ai.apply_status(AiStatus::Running, Some(AiRequestKind::Code), 1);
    ai.push_token(&token("fn "), 2);

    let untyped = AiResponsePayload {
        kind: None,
        content: "fn main() {}".into(),
        ts: None,
    };
    ai.finalize(&untyped, 3);

    assert_eq!(ai.messages()[0].kind, AiRequestKind::Code);
    assert_eq!(ai.messages()[0].content, "fn main() {}");

    ai.finalize(&untyped, 4);
    assert_eq!(ai.messages()[1].kind, AiRequestKind::HelpMe);
}

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use client_core::{ConsoleSettings, CredentialProvider, SessionConsole, SessionHandle};
use serde_json::{json, Value};
use shared::domain::{AiRequestKind, ConnectionStatus};
use tokio::{net::TcpListener, sync::mpsc, time::timeout};

#[derive(Debug)]
enum Observed {
    Handshake {
        query: HashMap<String, String>,
        auth: Option<String>,
    },
    Frame(Value),
}

fn script() -> Vec<(&'static str, Value)> {
    vec![
        ("session_joined", Value::Null),
        (
            "session:state",
            json!({ "transcript": ["Intro line."], "topics": [], "aiMessages": [] }),
        ),
        ("transcript:chunk", json!({ "text": "How would you", "ts": 1_000 })),
        ("transcript_chunk", json!({ "text": "How would you", "ts": 1_000 })),
        ("transcript_chunk", json!({ "text": "scale this?", "ts": 2_000 })),
        ("topic:event", json!({ "text": "Scaling", "ts": 2_000 })),
        ("ai_status", json!({ "type": "HELP_ME", "status": "running" })),
        ("ai:token", json!({ "token": "Shard " })),
        ("ai_token", json!({ "token": "by key." })),
        ("ai:response", json!({ "type": "HELP_ME", "content": "Shard by key." })),
    ]
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(observed): State<mpsc::UnboundedSender<Observed>>,
) -> impl IntoResponse {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let _ = observed.send(Observed::Handshake { query, auth });
    ws.on_upgrade(move |socket| run_session(socket, observed))
}

async fn forward_frames(
    socket: &mut WebSocket,
    observed: &mpsc::UnboundedSender<Observed>,
    count: usize,
) {
    let mut seen = 0;
    while seen < count {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                    let _ = observed.send(Observed::Frame(value));
                }
                seen += 1;
            }
            Some(Ok(_)) => {}
            _ => return,
        }
    }
}

async fn run_session(mut socket: WebSocket, observed: mpsc::UnboundedSender<Observed>) {
    // Both join spellings arrive before the server says anything.
    forward_frames(&mut socket, &observed, 2).await;
    for (event, data) in script() {
        let text = json!({ "event": event, "data": data }).to_string();
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    forward_frames(&mut socket, &observed, 2).await;
    // Dropping the socket ends the session from the server side.
}

async fn spawn_session_server() -> (SocketAddr, mpsc::UnboundedReceiver<Observed>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let (observed_tx, observed_rx) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(observed_tx);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, observed_rx)
}

async fn next_observed(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("server observation in time")
        .expect("server alive")
}

fn frame_event(observed: Observed) -> (String, Value) {
    match observed {
        Observed::Frame(value) => (
            value["event"].as_str().unwrap_or_default().to_string(),
            value["data"].clone(),
        ),
        other => panic!("expected frame, got {other:?}"),
    }
}

#[tokio::test]
async fn console_joins_and_builds_state_over_websocket() {
    let (addr, mut observed) = spawn_session_server().await;
    let settings = ConsoleSettings {
        server_url: format!("http://{addr}"),
        ..ConsoleSettings::default()
    };
    let mut console = SessionConsole::open(
        SessionHandle::new("room-9").with_join_code("4242"),
        settings,
    )
    .expect("console")
    .with_credentials(CredentialProvider::from_token(Some("tok".into())));

    console.connect().await.expect("connect");
    assert_eq!(
        console.store().connection_status(),
        ConnectionStatus::Connected
    );

    let Observed::Handshake { query, auth } = next_observed(&mut observed).await else {
        panic!("handshake first");
    };
    assert_eq!(query.get("sessionId").map(String::as_str), Some("room-9"));
    assert_eq!(query.get("joinCode").map(String::as_str), Some("4242"));
    assert_eq!(query.get("token").map(String::as_str), Some("tok"));
    assert_eq!(auth.as_deref(), Some("Bearer tok"));

    let (first, join) = frame_event(next_observed(&mut observed).await);
    let (second, _) = frame_event(next_observed(&mut observed).await);
    assert_eq!(first, "session:join");
    assert_eq!(second, "session_join");
    assert_eq!(join["sessionId"], "room-9");
    assert_eq!(join["joinCode"], "4242");

    for _ in 0..script().len() {
        timeout(Duration::from_secs(5), console.next_update())
            .await
            .expect("frame in time")
            .expect("channel open");
    }

    let paragraphs: Vec<_> = console
        .store()
        .transcript()
        .paragraphs()
        .iter()
        .map(|p| p.text.clone())
        .collect();
    assert_eq!(paragraphs, vec!["Intro line.", "How would you scale this?"]);
    assert_eq!(console.store().connection_status(), ConnectionStatus::Joined);
    assert_eq!(console.store().topics().len(), 1);
    let answers = console.store().ai_messages();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].content, "Shard by key.");
    assert!(!answers[0].streaming);

    console
        .ask_ai(AiRequestKind::FollowUp, Some("and caching?"))
        .expect("ask");
    let (event, request) = frame_event(next_observed(&mut observed).await);
    let (legacy, _) = frame_event(next_observed(&mut observed).await);
    assert_eq!(event, "ai:request");
    assert_eq!(legacy, "ai_request");
    assert_eq!(request["sessionId"], "room-9");
    assert_eq!(request["type"], "FOLLOW_UP");
    assert_eq!(
        request["messages"],
        json!([
            { "role": "user", "content": "Intro line.\nHow would you scale this?" },
            { "role": "user", "content": "and caching?" }
        ])
    );

    // Server hangs up after the request; the console reports it and stays down.
    loop {
        let update = timeout(Duration::from_secs(5), console.next_update())
            .await
            .expect("disconnect in time");
        if update.is_none() {
            break;
        }
    }
    assert_eq!(
        console.store().connection_status(),
        ConnectionStatus::Disconnected
    );
    assert!(console.ask_ai(AiRequestKind::HelpMe, None).is_err());
}

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use spark_api::AppState;
use spark_types::events::ChatEvent;

use common::{call, setup, sync};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Alice opens a conversation with Bob; returns its id.
async fn pending_conversation(app: &Router) -> Uuid {
    sync(app, "tok-alice").await;
    let bob = sync(app, "tok-bob").await;
    sync(app, "tok-carol").await;
    let (_, conv) = call(
        app,
        "POST",
        "/v1/conversations/start",
        Some("tok-alice"),
        Some(json!({ "recipient_id": bob, "content": "hi" })),
    )
    .await;
    conv["id"].as_str().unwrap().parse().unwrap()
}

fn chat_url(addr: SocketAddr, conversation_id: Uuid, token: &str) -> String {
    format!("ws://{}/v1/ws/chat/{}?token={}", addr, conversation_id, token)
}

async fn next_event(ws: &mut Socket) -> ChatEvent {
    let fut = async {
        loop {
            let msg = ws.next().await.expect("socket closed").unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str::<ChatEvent>(text.as_str()).unwrap();
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("no event within 5s")
}

async fn wait_for_viewers(state: &AppState, conversation_id: Uuid, expected: usize) {
    let settled = async {
        while state.hub.viewer_count(conversation_id) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), settled)
        .await
        .expect("viewer count never settled");
}

fn rejected_status(err: tungstenite::Error) -> u16 {
    match err {
        tungstenite::Error::Http(resp) => resp.status().as_u16(),
        other => panic!("expected HTTP rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn both_participants_see_new_messages() {
    let (app, state) = setup();
    let conversation_id = pending_conversation(&app).await;
    let addr = serve(app.clone()).await;

    let (mut alice_ws, _) = connect_async(chat_url(addr, conversation_id, "tok-alice"))
        .await
        .unwrap();
    let (mut bob_ws, _) = connect_async(chat_url(addr, conversation_id, "tok-bob"))
        .await
        .unwrap();

    for ws in [&mut alice_ws, &mut bob_ws] {
        match next_event(ws).await {
            ChatEvent::Ready {
                conversation_id: id,
                ..
            } => assert_eq!(id, conversation_id),
            other => panic!("expected Ready, got {:?}", other),
        }
    }
    wait_for_viewers(&state, conversation_id, 2).await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/conversations/{}/messages", conversation_id),
        Some("tok-bob"),
        Some(json!({ "content": "hey" })),
    )
    .await;
    assert!(status.is_success());

    for ws in [&mut alice_ws, &mut bob_ws] {
        match next_event(ws).await {
            ChatEvent::MessageCreate(message) => {
                assert_eq!(message.conversation_id, conversation_id);
                assert_eq!(message.content, "hey");
            }
            other => panic!("expected MessageCreate, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn non_participant_is_refused_before_upgrade() {
    let (app, state) = setup();
    let conversation_id = pending_conversation(&app).await;
    let addr = serve(app).await;

    let err = connect_async(chat_url(addr, conversation_id, "tok-carol"))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(err), 403);

    let err = connect_async(chat_url(addr, conversation_id, "bogus"))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(err), 401);

    assert_eq!(state.hub.viewer_count(conversation_id), 0);
}

#[tokio::test]
async fn closing_the_socket_unregisters_the_viewer() {
    let (app, state) = setup();
    let conversation_id = pending_conversation(&app).await;
    let addr = serve(app).await;

    let (mut ws, _) = connect_async(chat_url(addr, conversation_id, "tok-alice"))
        .await
        .unwrap();
    next_event(&mut ws).await;
    wait_for_viewers(&state, conversation_id, 1).await;

    ws.close(None).await.unwrap();
    wait_for_viewers(&state, conversation_id, 0).await;
    assert_eq!(state.hub.conversation_count(), 0);
}

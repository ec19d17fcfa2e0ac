use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt as _;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::models::{WsClientMessage, WsServerMessage};
use crate::conversation::Orchestrator;

#[get("/ws/chat/{session_id}")]
pub async fn ws_chat(
    req: HttpRequest,
    body: web::Payload,
    orchestrator: web::Data<Arc<Orchestrator>>,
    session_id: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let id = session_id.into_inner();

    // Sessions auto-create on the write path; an unknown id here starts a
    // fresh conversation rather than rejecting the socket.
    orchestrator.store().get_or_create(id);

    info!("WebSocket connection established for session {:?}", id);

    let orchestrator = orchestrator.as_ref().clone();

    actix_web::rt::spawn(async move {
        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                Message::Ping(bytes) => {
                    if session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Message::Text(text) => {
                    let client_msg: Result<WsClientMessage, _> = serde_json::from_str(&text);
                    if let Ok(msg) = client_msg {
                        if msg.r#type == "message" {
                            handle_chat_message(msg.content, id, &orchestrator, &mut session).await;
                        }
                    }
                }
                Message::Close(reason) => {
                    let _ = session.close(reason).await;
                    break;
                }
                _ => {}
            }
        }
        info!("WebSocket connection closed for session {:?}", id);
    });

    Ok(response)
}

async fn handle_chat_message(
    content: String,
    session_id: Uuid,
    orchestrator: &Arc<Orchestrator>,
    session: &mut actix_ws::Session,
) {
    let (tx, mut rx) = mpsc::channel::<String>(100);

    // Bridge orchestrator chunks onto the socket. On a failed send the
    // client is gone: the receiver is dropped so the orchestrator's sends
    // fail fast, while it keeps accumulating the full reply for history.
    let mut ws = session.clone();
    let forward = actix_web::rt::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            let msg = WsServerMessage {
                r#type: "chunk".to_string(),
                content: chunk,
            };
            if ws.text(serde_json::to_string(&msg).unwrap()).await.is_err() {
                break;
            }
        }
    });

    let outcome = orchestrator
        .chat_turn_streaming(Some(session_id), &content, tx)
        .await;
    let _ = forward.await;

    match outcome {
        Ok(_) => {
            let done = WsServerMessage {
                r#type: "done".to_string(),
                content: String::new(),
            };
            let _ = session.text(serde_json::to_string(&done).unwrap()).await;
        }
        Err(e) => {
            warn!("WebSocket chat turn rejected: {}", e);
            let err = WsServerMessage {
                r#type: "error".to_string(),
                content: e.to_string(),
            };
            let _ = session.text(serde_json::to_string(&err).unwrap()).await;
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_chat);
}

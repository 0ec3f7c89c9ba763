//! Per-connection WebSocket session.
//!
//! A connection binds to one broadcast. It auto-joins the `timeline`
//! and `presence` rooms, counts as one viewer for its lifetime, and
//! may subscribe to more channels. Two tasks per socket: the actix-ws
//! stream loop here, and a writer task draining the registry queue.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use super::{Channel, ClientFrame, PushBody, PushMessage, SubscriberId};
use crate::collab::Identity;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub broadcast_id: Uuid,
    pub token: Option<String>,
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<WsParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let broadcast_id = params.broadcast_id;

    if state.directory.get(broadcast_id).await.is_none() {
        return Err(AppError::NotFound.into());
    }

    // Anonymous viewers are admitted; a bad token is not.
    let identity = match &params.token {
        Some(token) => Some(
            state
                .auth
                .verify(token)
                .await
                .ok_or(AppError::Unauthorized)?,
        ),
        None => None,
    };

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;
    let state = state.into_inner();
    actix_web::rt::spawn(run_session(
        (*state).clone(),
        broadcast_id,
        identity,
        session,
        msg_stream,
    ));
    Ok(response)
}

async fn run_session(
    state: AppState,
    broadcast_id: Uuid,
    identity: Option<Identity>,
    session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let registry = state.hub.registry().clone();
    let user_id = identity.as_ref().map(|i| i.user_id);

    let (subscriber_id, sender, mut receiver) = super::RoomRegistry::open_connection();
    registry
        .subscribe(broadcast_id, Channel::Timeline, subscriber_id, user_id, sender.clone())
        .await;
    registry
        .subscribe(broadcast_id, Channel::Presence, subscriber_id, user_id, sender.clone())
        .await;

    if let Err(e) = state.presence.join(broadcast_id).await {
        tracing::warn!(%broadcast_id, error = %e, "presence join failed");
    }

    // Writer task: registry queue -> socket.
    let mut writer = session.clone();
    let write_task = actix_web::rt::spawn(async move {
        while let Some(text) = receiver.recv().await {
            if writer.text(text).await.is_err() {
                break;
            }
        }
    });

    let mut session = session;
    while let Some(Ok(msg)) = msg_stream.next().await {
        match msg {
            Message::Text(text) => {
                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(_) => {
                        send_error(&sender, Channel::Timeline, "malformed frame");
                        continue;
                    }
                };
                handle_frame(
                    &state,
                    broadcast_id,
                    subscriber_id,
                    identity.as_ref(),
                    &sender,
                    frame,
                )
                .await;
            }
            Message::Ping(bytes) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Teardown in reverse: stop counting this viewer, then release the
    // subscriptions.
    if let Err(e) = state.presence.leave(broadcast_id).await {
        tracing::warn!(%broadcast_id, error = %e, "presence leave failed");
    }
    registry.remove_connection(broadcast_id, subscriber_id).await;
    write_task.abort();
    let _ = session.close(None).await;
    tracing::debug!(%broadcast_id, "websocket session closed");
}

async fn handle_frame(
    state: &AppState,
    broadcast_id: Uuid,
    subscriber_id: SubscriberId,
    identity: Option<&Identity>,
    sender: &tokio::sync::mpsc::UnboundedSender<String>,
    frame: ClientFrame,
) {
    let registry = state.hub.registry();
    match frame {
        ClientFrame::Subscribe { channels } => {
            for channel in &channels {
                registry
                    .subscribe(
                        broadcast_id,
                        *channel,
                        subscriber_id,
                        identity.map(|i| i.user_id),
                        sender.clone(),
                    )
                    .await;
            }
            send_push(
                sender,
                PushMessage::new(Channel::Timeline, PushBody::Subscribed { channels }),
            );
        }
        ClientFrame::Unsubscribe { channels } => {
            for channel in channels {
                registry
                    .unsubscribe(broadcast_id, channel, subscriber_id)
                    .await;
            }
        }
        ClientFrame::ChatMessage {
            content,
            idempotency_key,
        } => {
            let Some(identity) = identity else {
                send_error(sender, Channel::Chat, "authentication required");
                return;
            };
            if let Err(e) = state
                .chat
                .send(broadcast_id, identity, &content, &idempotency_key)
                .await
            {
                send_error(sender, Channel::Chat, &e.to_string());
            }
        }
        ClientFrame::StateSync { last_event_id } => {
            let events = match last_event_id {
                Some(since) => state.timeline.list_since(broadcast_id, since).await,
                None => state.timeline.list(broadcast_id, i64::MAX, 0).await,
            };
            match events {
                Ok(events) => {
                    for event in events {
                        if let Ok(value) = serde_json::to_value(&event) {
                            send_push(
                                sender,
                                PushMessage::new(
                                    Channel::Timeline,
                                    PushBody::TimelineEvent(value),
                                ),
                            );
                        }
                    }
                }
                Err(e) => send_error(sender, Channel::Timeline, &e.to_string()),
            }
        }
        ClientFrame::Ping => {
            send_push(sender, PushMessage::new(Channel::Timeline, PushBody::Pong));
        }
    }
}

fn send_push(sender: &tokio::sync::mpsc::UnboundedSender<String>, msg: PushMessage) {
    if let Ok(text) = serde_json::to_string(&msg) {
        let _ = sender.send(text);
    }
}

fn send_error(sender: &tokio::sync::mpsc::UnboundedSender<String>, channel: Channel, message: &str) {
    send_push(
        sender,
        PushMessage::new(
            channel,
            PushBody::Error {
                message: message.to_string(),
            },
        ),
    );
}

// ============================
// crates/relay-lib/src/ws_router.rs
// ============================
//! WebSocket endpoint: credential check on upgrade, envelope decoding, and
//! dispatch into the registry and room actors.
use crate::error::AppError;
use crate::metrics as keys;
use crate::registry::RoomRegistry;
use crate::room_actor::{LeaveOutcome, RoomHandle};
use crate::session::{ClientHandle, Outbound, SessionContext};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_common::{ClientMessage, Participant, ServerMessage};
use metrics::{counter, gauge};
use serde::Deserialize;
use tokio::sync::mpsc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

fn text(s: String) -> Message {
    Message::Text(Utf8Bytes::from(s))
}

/// Upgrade handler. The credential is verified before the socket is accepted;
/// an unverifiable one rejects the connection outright.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let token = params
        .token
        .ok_or_else(|| AppError::Unauthorized("missing credential".to_string()))?;
    let uid = state.auth.verify(&token).await?;
    counter!(keys::WS_CONNECTION).increment(1);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, uid)))
}

async fn handle_socket(socket: WebSocket, state: AppState, uid: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let handle = ClientHandle::new(uid.clone(), tx);
    let mut ctx = SessionContext::new(uid);

    gauge!(keys::WS_ACTIVE).increment(1.0);

    // Writer task: drains the session's outbound queue so room actors never
    // wait on this transport. Ends on a forced close or a dead sink.
    let mut send_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Message(msg) => {
                    let Ok(json) = serde_json::to_string(&msg) else {
                        continue;
                    };
                    if sink.send(text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(raw))) => {
                    handle_frame(raw.as_str(), &state, &mut ctx, &handle).await;
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {} // ping/pong/binary: nothing to route
            },
            // Writer gone means the connection was force-closed (kick,
            // host-left) or the transport died; stop reading.
            _ = &mut send_task => break,
        }
    }

    // Transport closed: run the departure cascade for whatever context the
    // session last held. `cleanup` takes the room id, so a second pass (close
    // racing close) is a no-op.
    cleanup(&state, &mut ctx).await;
    send_task.abort();
    gauge!(keys::WS_ACTIVE).decrement(1.0);
}

/// Decode one frame and dispatch it, replying with an `error` envelope when
/// the operation fails or the kind is unknown. An undecodable frame is logged
/// and otherwise ignored; the connection stays open.
async fn handle_frame(raw: &str, state: &AppState, ctx: &mut SessionContext, handle: &ClientHandle) {
    match decode(raw) {
        Decoded::Envelope(msg) => {
            if let Err(e) = dispatch(msg, state, ctx, handle).await {
                handle.send(ServerMessage::Error {
                    message: e.to_string(),
                });
            }
        }
        Decoded::UnknownKind(kind) => {
            handle.send(ServerMessage::Error {
                message: format!("unsupported envelope kind: {kind}"),
            });
        }
        Decoded::Malformed(e) => {
            tracing::debug!(uid = %ctx.uid, error = %e, "malformed envelope dropped");
        }
    }
}

/// Decoding outcome for one inbound frame.
#[derive(Debug)]
pub enum Decoded {
    Envelope(ClientMessage),
    /// Valid JSON whose `kind` the relay does not recognize
    UnknownKind(String),
    /// Not valid JSON, or a recognized kind with missing/mistyped fields
    Malformed(serde_json::Error),
}

pub fn decode(raw: &str) -> Decoded {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(e),
    };
    let kind = value.get("kind").and_then(|k| k.as_str()).map(str::to_string);
    match serde_json::from_value::<ClientMessage>(value) {
        Ok(msg) => Decoded::Envelope(msg),
        Err(e) => match kind {
            Some(kind) if !ClientMessage::KINDS.contains(&kind.as_str()) => {
                Decoded::UnknownKind(kind)
            }
            _ => Decoded::Malformed(e),
        },
    }
}

fn current_room(registry: &RoomRegistry, ctx: &SessionContext) -> Result<RoomHandle, AppError> {
    let room_id = ctx
        .room_id
        .as_deref()
        .ok_or_else(|| AppError::NotFound("not in a room".to_string()))?;
    registry
        .get(room_id)
        .ok_or_else(|| AppError::NotFound(format!("room {room_id} is closed")))
}

/// Route one decoded envelope to the operation its kind implies. The room is
/// always resolved from the session context, never from later message fields.
pub async fn dispatch(
    msg: ClientMessage,
    state: &AppState,
    ctx: &mut SessionContext,
    handle: &ClientHandle,
) -> Result<(), AppError> {
    match msg {
        ClientMessage::CreateRoom {
            room_id,
            participant,
            capacity,
            state: room_state,
        } => {
            if ctx.room_id.is_some() {
                return Err(AppError::Conflict("already in a room".to_string()));
            }
            if capacity < 1 {
                return Err(AppError::InvalidInput(
                    "capacity must be at least 1".to_string(),
                ));
            }
            let host = Participant {
                uid: ctx.uid.clone(),
                name: participant.name,
            };
            state.registry.create(
                &room_id,
                host,
                handle.clone(),
                capacity,
                room_state,
                state.mirror.clone(),
            )?;
            ctx.room_id = Some(room_id.clone());
            handle.send(ServerMessage::RoomCreated { room_id });
            Ok(())
        }

        ClientMessage::JoinRoom {
            room_id,
            participant,
        } => {
            if ctx.room_id.is_some() {
                return Err(AppError::Conflict("already in a room".to_string()));
            }
            let room = state
                .registry
                .get(&room_id)
                .ok_or_else(|| AppError::NotFound(format!("no room {room_id}")))?;
            let guest = Participant {
                uid: ctx.uid.clone(),
                name: participant.name,
            };
            room.join(guest, handle.clone()).await?;
            ctx.room_id = Some(room_id);
            Ok(())
        }

        ClientMessage::LeaveRoom => {
            let room_id = ctx
                .room_id
                .take()
                .ok_or_else(|| AppError::NotFound("not in a room".to_string()))?;
            if let Some(room) = state.registry.get(&room_id) {
                if room.leave(&ctx.uid).await == LeaveOutcome::RoomClosed {
                    state.registry.destroy(&room_id);
                }
            }
            Ok(())
        }

        ClientMessage::Kick { uid } => {
            let room = current_room(&state.registry, ctx)?;
            room.kick(&ctx.uid, &uid).await
        }

        ClientMessage::Block { uid } => {
            let room = current_room(&state.registry, ctx)?;
            room.block(&ctx.uid, &uid).await
        }

        ClientMessage::Signal { to, payload } => {
            let room = current_room(&state.registry, ctx)?;
            room.signal(ctx.uid.clone(), to, payload);
            Ok(())
        }

        ClientMessage::SetCapacity { delta } => {
            if delta != 1 && delta != -1 {
                return Err(AppError::InvalidInput(
                    "capacity delta must be -1 or +1".to_string(),
                ));
            }
            let room = current_room(&state.registry, ctx)?;
            room.set_capacity(&ctx.uid, delta).await
        }

        ClientMessage::SetState { state: new_state } => {
            let room = current_room(&state.registry, ctx)?;
            room.set_state(&ctx.uid, &new_state).await
        }

        ClientMessage::MediaStarted => {
            let room = current_room(&state.registry, ctx)?;
            room.media_started(&ctx.uid).await
        }
    }
}

/// Exactly-once departure on transport close. Taking the room id out of the
/// context makes a duplicate invocation a no-op, and a room whose actor
/// already terminated resolves to `NotMember` inside `leave`.
pub async fn cleanup(state: &AppState, ctx: &mut SessionContext) {
    let Some(room_id) = ctx.room_id.take() else {
        return;
    };
    let Some(room) = state.registry.get(&room_id) else {
        return;
    };
    if room.leave(&ctx.uid).await == LeaveOutcome::RoomClosed {
        state.registry.destroy(&room_id);
    }
}

// ==========================
// crates/relay-lib/tests/room_actor.rs
// ==========================
//! Integration tests for the room actor: admission, departures, kicks,
//! blocks, capacity/state changes, and signal routing.
use huddle_common::{Participant, ServerMessage};
use relay_lib::error::AppError;
use relay_lib::mirror::{MirrorHandle, MirrorOp};
use relay_lib::room_actor::{LeaveOutcome, RoomHandle};
use relay_lib::session::{ClientHandle, Outbound};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn participant(uid: &str) -> Participant {
    Participant {
        uid: uid.to_string(),
        name: format!("{uid} name"),
    }
}

fn client(uid: &str) -> (ClientHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ClientHandle::new(uid.to_string(), tx), rx)
}

/// Spawn a room with the given capacity; returns the handle plus the host's
/// inbox.
fn spawn_room(capacity: usize) -> (RoomHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (host_handle, host_rx) = client("host");
    let room = RoomHandle::spawn(
        "r1".to_string(),
        participant("host"),
        host_handle,
        capacity,
        "waiting".to_string(),
        MirrorHandle::noop(),
    );
    (room, host_rx)
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> ServerMessage {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(Outbound::Message(msg))) => msg,
        other => panic!("expected a message, got {other:?}"),
    }
}

async fn next_close(rx: &mut mpsc::UnboundedReceiver<Outbound>) {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(Outbound::Close)) => {}
        other => panic!("expected a close, got {other:?}"),
    }
}

/// Collect whatever is already enqueued (plus a short grace period).
async fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut items = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        items.push(item);
    }
    items
}

fn count_expelled_notices(items: &[Outbound], expect_uid: &str) -> usize {
    items
        .iter()
        .filter(|item| {
            matches!(item, Outbound::Message(ServerMessage::GuestExpelled { uid }) if uid == expect_uid)
        })
        .count()
}

#[tokio::test]
async fn admits_guests_up_to_capacity_then_rejects_with_full() {
    let (room, _host_rx) = spawn_room(2);

    let (g1, _rx1) = client("g1");
    let (g2, _rx2) = client("g2");
    let (g3, _rx3) = client("g3");

    room.join(participant("g1"), g1).await.unwrap();
    room.join(participant("g2"), g2).await.unwrap();

    let err = room.join(participant("g3"), g3).await.unwrap_err();
    assert!(matches!(err, AppError::Full));
}

#[tokio::test]
async fn blocked_uid_is_rejected_regardless_of_capacity() {
    let (room, _host_rx) = spawn_room(1);

    room.block("host", "x").await.unwrap();

    // Block takes effect before any subsequent join
    let (x, _x_rx) = client("x");
    let err = room.join(participant("x"), x).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // The room stayed empty: a probe guest is admitted and sees only the host
    let (probe, mut probe_rx) = client("probe");
    room.join(participant("probe"), probe).await.unwrap();
    let ServerMessage::Joined { participants, .. } = next_message(&mut probe_rx).await else {
        panic!("expected a joined envelope");
    };
    assert_eq!(participants, vec![participant("host")]);
}

#[tokio::test]
async fn join_notifies_host_and_every_existing_guest() {
    let (room, mut host_rx) = spawn_room(3);

    let (g1, mut g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();

    let (g2, mut g2_rx) = client("g2");
    room.join(participant("g2"), g2).await.unwrap();

    // Host saw both arrivals
    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::GuestJoined {
            participant: participant("g1")
        }
    );
    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::GuestJoined {
            participant: participant("g2")
        }
    );

    // g1 got its own context first, then the later arrival
    assert!(matches!(
        next_message(&mut g1_rx).await,
        ServerMessage::Joined { .. }
    ));
    assert_eq!(
        next_message(&mut g1_rx).await,
        ServerMessage::GuestJoined {
            participant: participant("g2")
        }
    );

    // g2's context lists host and g1, host first
    let ServerMessage::Joined {
        room_id,
        state,
        capacity,
        media_started,
        participants,
    } = next_message(&mut g2_rx).await
    else {
        panic!("expected a joined envelope");
    };
    assert_eq!(room_id, "r1");
    assert_eq!(state, "waiting");
    assert_eq!(capacity, 3);
    assert!(!media_started);
    assert_eq!(participants[0], participant("host"));
    assert_eq!(participants.len(), 2);
    assert!(participants.contains(&participant("g1")));
}

#[tokio::test]
async fn duplicate_member_join_is_a_conflict() {
    let (room, _host_rx) = spawn_room(4);

    let (g1, _rx1) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();

    let (dup, _dup_rx) = client("g1");
    let err = room.join(participant("g1"), dup).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn kick_expels_target_and_notifies_everyone_else_once() {
    let (room, mut host_rx) = spawn_room(3);

    let (g1, mut g1_rx) = client("g1");
    let (g2, mut g2_rx) = client("g2");
    room.join(participant("g1"), g1).await.unwrap();
    room.join(participant("g2"), g2).await.unwrap();

    // Clear the join chatter before the interesting part
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;
    drain(&mut g2_rx).await;

    room.kick("host", "g1").await.unwrap();

    // Target: expelled notice, then forced close
    assert_eq!(next_message(&mut g1_rx).await, ServerMessage::Expelled);
    next_close(&mut g1_rx).await;

    // Host and the remaining guest each hear about it exactly once
    let host_items = drain(&mut host_rx).await;
    assert_eq!(count_expelled_notices(&host_items, "g1"), 1);
    let g2_items = drain(&mut g2_rx).await;
    assert_eq!(count_expelled_notices(&g2_items, "g1"), 1);

    // Membership shrank: a newcomer sees host and g2 only
    let (probe, mut probe_rx) = client("probe");
    room.join(participant("probe"), probe).await.unwrap();
    let ServerMessage::Joined { participants, .. } = next_message(&mut probe_rx).await else {
        panic!("expected a joined envelope");
    };
    assert_eq!(participants.len(), 2);
    assert!(!participants.contains(&participant("g1")));
}

#[tokio::test]
async fn kick_is_host_only_and_requires_a_present_guest() {
    let (room, _host_rx) = spawn_room(3);

    let (g1, _rx1) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();

    let err = room.kick("g1", "host").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = room.kick("host", "ghost").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn host_departure_closes_the_room_and_every_guest() {
    let (room, _host_rx) = spawn_room(2);

    let (g1, mut g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    drain(&mut g1_rx).await;

    assert_eq!(room.leave("host").await, LeaveOutcome::RoomClosed);

    assert_eq!(next_message(&mut g1_rx).await, ServerMessage::HostLeft);
    next_close(&mut g1_rx).await;

    // The actor is gone; a repeated departure is a harmless no-op
    assert_eq!(room.leave("host").await, LeaveOutcome::NotMember);

    // And no late command can resurrect it
    let (late, _late_rx) = client("late");
    let err = room.join(participant("late"), late).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn guest_departure_notifies_the_rest() {
    let (room, mut host_rx) = spawn_room(3);

    let (g1, mut g1_rx) = client("g1");
    let (g2, mut g2_rx) = client("g2");
    room.join(participant("g1"), g1).await.unwrap();
    room.join(participant("g2"), g2).await.unwrap();
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;
    drain(&mut g2_rx).await;

    assert_eq!(room.leave("g1").await, LeaveOutcome::GuestRemoved);
    assert_eq!(room.leave("stranger").await, LeaveOutcome::NotMember);

    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::GuestLeft { uid: "g1".into() }
    );
    assert_eq!(
        next_message(&mut g2_rx).await,
        ServerMessage::GuestLeft { uid: "g1".into() }
    );

    // The departed guest hears nothing further
    assert!(drain(&mut g1_rx).await.is_empty());
}

#[tokio::test]
async fn block_expels_a_present_guest_and_bars_rejoin() {
    let (room, mut host_rx) = spawn_room(3);

    let (g1, mut g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;

    room.block("host", "g1").await.unwrap();

    assert_eq!(next_message(&mut g1_rx).await, ServerMessage::Expelled);
    next_close(&mut g1_rx).await;
    let host_items = drain(&mut host_rx).await;
    assert_eq!(count_expelled_notices(&host_items, "g1"), 1);

    let (again, _again_rx) = client("g1");
    let err = room.join(participant("g1"), again).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Only the host may block
    let err = room.block("g2", "host").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn capacity_changes_broadcast_and_never_drop_below_one() {
    let (room, mut host_rx) = spawn_room(1);

    // Shrinking an already-minimal room clamps at one
    room.set_capacity("host", -1).await.unwrap();
    room.set_capacity("host", -1).await.unwrap();
    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::RoomUpdated
    );
    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::RoomUpdated
    );

    let (g1, _rx1) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    let (g2, _rx2) = client("g2");
    let err = room.join(participant("g2"), g2).await.unwrap_err();
    assert!(matches!(err, AppError::Full));

    // Growing makes space for the second guest
    room.set_capacity("host", 1).await.unwrap();
    let (g2, _rx2) = client("g2");
    room.join(participant("g2"), g2).await.unwrap();

    // Guests may not resize the room
    let err = room.set_capacity("g1", 1).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn state_changes_broadcast_and_reach_later_joiners() {
    let (room, mut host_rx) = spawn_room(3);

    let (g1, mut g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;

    room.set_state("host", "active").await.unwrap();

    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::RoomUpdated
    );
    assert_eq!(next_message(&mut g1_rx).await, ServerMessage::RoomUpdated);

    let (g2, mut g2_rx) = client("g2");
    room.join(participant("g2"), g2).await.unwrap();
    let ServerMessage::Joined { state, .. } = next_message(&mut g2_rx).await else {
        panic!("expected a joined envelope");
    };
    assert_eq!(state, "active");
}

#[tokio::test]
async fn media_started_is_host_only_and_broadcasts() {
    let (room, mut host_rx) = spawn_room(2);

    let (g1, mut g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;

    let err = room.media_started("g1").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    room.media_started("host").await.unwrap();
    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::RoomUpdated
    );
    assert_eq!(next_message(&mut g1_rx).await, ServerMessage::RoomUpdated);

    // A later joiner sees the flag in its room context
    let (g2, mut g2_rx) = client("g2");
    room.join(participant("g2"), g2).await.unwrap();
    let ServerMessage::Joined { media_started, .. } = next_message(&mut g2_rx).await else {
        panic!("expected a joined envelope");
    };
    assert!(media_started);
}

#[tokio::test]
async fn signal_is_unicast_to_the_target_only() {
    let (room, mut host_rx) = spawn_room(3);

    let (g1, mut g1_rx) = client("g1");
    let (g2, mut g2_rx) = client("g2");
    room.join(participant("g1"), g1).await.unwrap();
    room.join(participant("g2"), g2).await.unwrap();
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;
    drain(&mut g2_rx).await;

    let payload = json!({ "sdp": "v=0 ..." });
    room.signal("g1".into(), "host".into(), payload.clone());

    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::Signal {
            from: "g1".into(),
            payload,
        }
    );
    assert!(drain(&mut g2_rx).await.is_empty());
}

#[tokio::test]
async fn signal_to_an_absent_target_is_silently_dropped() {
    let (room, mut host_rx) = spawn_room(2);

    let (g1, mut g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    drain(&mut host_rx).await;
    drain(&mut g1_rx).await;

    room.signal("g1".into(), "ghost".into(), json!({ "ice": [] }));
    // Senders from outside the room are dropped too
    room.signal("stranger".into(), "host".into(), json!({ "ice": [] }));

    assert!(drain(&mut host_rx).await.is_empty());
    assert!(drain(&mut g1_rx).await.is_empty());
}

#[tokio::test]
async fn lifecycle_is_projected_into_the_mirror() {
    let (mirror_tx, mut mirror_rx) = mpsc::unbounded_channel();
    let (host_handle, _host_rx) = client("host");
    let room = RoomHandle::spawn(
        "r1".to_string(),
        participant("host"),
        host_handle,
        2,
        "waiting".to_string(),
        MirrorHandle::new(mirror_tx),
    );

    let (g1, _g1_rx) = client("g1");
    room.join(participant("g1"), g1).await.unwrap();
    room.block("host", "x").await.unwrap();
    assert_eq!(room.leave("host").await, LeaveOutcome::RoomClosed);

    let mut ops = Vec::new();
    while let Ok(op) = mirror_rx.try_recv() {
        ops.push(op);
    }

    assert!(matches!(
        ops[0],
        MirrorOp::UpsertRoom { ref room_id, capacity: 2, .. } if room_id == "r1"
    ));
    assert!(matches!(
        ops[1],
        MirrorOp::UpsertParticipant { host: true, .. }
    ));
    assert!(matches!(
        ops[2],
        MirrorOp::UpsertParticipant { host: false, ref participant, .. } if participant.uid == "g1"
    ));
    assert!(matches!(
        ops[3],
        MirrorOp::SetBlocked { ref uid, .. } if uid == "x"
    ));
    assert!(matches!(ops[4], MirrorOp::RemoveRoom { .. }));
}

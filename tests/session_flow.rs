use chrono::{DateTime, TimeZone, Utc};
use roomtalk::backend_fake::{FakeGateway, FakeHistorySource, RecordingReadTracker};
use roomtalk::connection::ChatFrame;
use roomtalk::domain_model::*;
use roomtalk::session::{SendError, SessionController, SessionError, SessionState};
use roomtalk::session_port::{HistoryFetchError, SessionFault, SessionObserver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUYER: ParticipantId = ParticipantId(1);
const SELLER: ParticipantId = ParticipantId(9);

// region harness

/// Observer that records everything it is told, as message-id lists.
#[derive(Default)]
struct RecordingObserver {
    snapshots: Mutex<Vec<Vec<i64>>>,
    failures: Mutex<Vec<String>>,
    history_warnings: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn snapshots(&self) -> Vec<Vec<i64>> {
        self.snapshots.lock().unwrap().clone()
    }

    fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }

    fn history_warnings(&self) -> Vec<String> {
        self.history_warnings.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn timeline_changed(&self, snapshot: &[ChatMessage]) {
        let ids = snapshot.iter().map(|m| m.message_id.0).collect();
        self.snapshots.lock().unwrap().push(ids);
    }

    fn session_failed(&self, fault: &SessionFault) {
        self.failures.lock().unwrap().push(fault.to_string());
    }

    fn history_unavailable(&self, reason: &HistoryFetchError) {
        self.history_warnings.lock().unwrap().push(reason.to_string());
    }
}

struct Harness {
    gateway: Arc<FakeGateway>,
    history: Arc<FakeHistorySource>,
    read_tracker: Arc<RecordingReadTracker>,
    observer: Arc<RecordingObserver>,
    controller: SessionController,
}

fn harness() -> Harness {
    let gateway = Arc::new(FakeGateway::new());
    gateway.register_name(BUYER, "buyer");
    let history = Arc::new(FakeHistorySource::new());
    let read_tracker = Arc::new(RecordingReadTracker::new());
    let observer = Arc::new(RecordingObserver::default());
    let controller = SessionController::new(
        BUYER,
        AccessToken("secret".to_string()),
        gateway.clone(),
        history.clone(),
        read_tracker.clone(),
        observer.clone(),
    );
    Harness {
        gateway,
        history,
        read_tracker,
        observer,
        controller,
    }
}

// Each test claims its own room id; the one-session-per-room guard is
// process-wide and tests run concurrently.
fn room(id: i64) -> Room {
    Room {
        room_id: RoomId(id),
        counterpart: SELLER,
        counterpart_name: "seller".to_string(),
        listing_id: ListingId(id * 10),
    }
}

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 12, minute, 0).unwrap()
}

fn history_message(room_id: RoomId, id: i64, minute: u32) -> ChatMessage {
    ChatMessage {
        message_id: MessageId(id),
        room_id,
        sender: SELLER,
        sender_name: "seller".to_string(),
        body: format!("history {id}"),
        sent_at: at(minute),
        origin: DeliveryOrigin::History,
    }
}

fn live_frame(room_id: RoomId, id: i64, minute: u32) -> ChatFrame {
    ChatFrame {
        from: SELLER,
        from_name: "seller".to_string(),
        body: format!("live {id}"),
        sent_at: at(minute),
        message_id: MessageId(id),
        room: Some(room_id),
    }
}

async fn ids(controller: &SessionController) -> Vec<i64> {
    controller
        .snapshot()
        .await
        .iter()
        .map(|m| m.message_id.0)
        .collect()
}

async fn wait_for_ids(controller: &SessionController, expected: &[i64]) {
    let mut last = Vec::new();
    for _ in 0..400 {
        last = ids(controller).await;
        if last == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timeline stuck at {last:?}, wanted {expected:?}");
}

async fn wait_for_state(controller: &SessionController, expected: SessionState) {
    for _ in 0..400 {
        if controller.state().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {expected:?}");
}

async fn settle(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// endregion

#[tokio::test]
async fn history_then_live_in_order() {
    let h = harness();
    let room = room(401);
    h.history.push(history_message(room.room_id, 1, 0));
    h.history.push(history_message(room.room_id, 2, 1));
    h.gateway.set_next_message_id(3);

    h.controller.start_session(room.clone()).await.unwrap();
    assert_eq!(h.controller.state().await, SessionState::Active);
    wait_for_ids(&h.controller, &[1, 2]).await;
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    h.controller.send_message("is it still available?").await.unwrap();
    wait_for_ids(&h.controller, &[1, 2, 3]).await;

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot[2].sender, BUYER);
    assert_eq!(snapshot[2].sender_name, "buyer");
    assert_eq!(snapshot[2].body, "is it still available?");
    assert_eq!(snapshot[2].origin, DeliveryOrigin::Live);
}

#[tokio::test]
async fn live_before_history_converges() {
    let h = harness();
    let room = room(402);
    h.history.push(history_message(room.room_id, 1, 0));
    h.history.push(history_message(room.room_id, 2, 1));
    let release = h.history.hold().await;

    h.controller.start_session(room.clone()).await.unwrap();
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    // the live frame lands while the history page is still in flight
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 3, 5))
        .await
        .unwrap();
    wait_for_ids(&h.controller, &[3]).await;

    release.send(()).unwrap();
    wait_for_ids(&h.controller, &[1, 2, 3]).await;
}

#[tokio::test]
async fn redelivered_message_dropped() {
    let h = harness();
    let room = room(403);
    h.history.push(history_message(room.room_id, 1, 0));

    h.controller.start_session(room.clone()).await.unwrap();
    wait_for_ids(&h.controller, &[1]).await;
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 2, 2))
        .await
        .unwrap();
    wait_for_ids(&h.controller, &[1, 2]).await;

    // retransmit of 2, then a fresh 3; waiting for 3 proves the
    // retransmit was processed and swallowed
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 2, 2))
        .await
        .unwrap();
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 3, 3))
        .await
        .unwrap();
    wait_for_ids(&h.controller, &[1, 2, 3]).await;

    for snapshot in h.observer.snapshots() {
        assert!(snapshot.iter().filter(|id| **id == 2).count() <= 1);
    }
}

#[tokio::test]
async fn send_rejected_outside_active() {
    let h = harness();
    let err = h.controller.send_message("hello").await.unwrap_err();
    assert!(matches!(err, SendError::NotActive(SessionState::Idle)));

    h.controller.start_session(room(404)).await.unwrap();
    h.controller.end_session().await;
    let err = h.controller.send_message("hello").await.unwrap_err();
    assert!(matches!(err, SendError::NotActive(SessionState::Closed)));
}

#[tokio::test]
async fn start_rejected_while_active() {
    let h = harness();
    h.controller.start_session(room(405)).await.unwrap();
    let err = h.controller.start_session(room(499)).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::AlreadyStarted(SessionState::Active)
    ));
}

#[tokio::test]
async fn failed_dial_leaves_session_failed() {
    let h = harness();
    h.gateway.fail_next_open();

    let err = h.controller.start_session(room(406)).await.unwrap_err();
    assert!(matches!(err, SessionError::Connection(_)));
    assert_eq!(h.controller.state().await, SessionState::Failed);
    assert_eq!(h.observer.failures().len(), 1);

    let err = h.controller.send_message("hello").await.unwrap_err();
    assert!(matches!(err, SendError::NotActive(SessionState::Failed)));

    // the gateway only failed the one dial; a restart goes through
    h.controller.restart_session().await.unwrap();
    assert_eq!(h.controller.state().await, SessionState::Active);
    assert_eq!(h.observer.failures().len(), 1);
}

#[tokio::test]
async fn restart_requires_a_failed_session() {
    let h = harness();
    let err = h.controller.restart_session().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotResumable(SessionState::Idle)
    ));
}

#[tokio::test]
async fn teardown_silences_late_completions() {
    let h = harness();
    let room = room(407);
    h.history.push(history_message(room.room_id, 1, 0));
    let release = h.history.hold().await;

    h.controller.start_session(room.clone()).await.unwrap();
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;
    h.controller.end_session().await;
    assert_eq!(h.controller.state().await, SessionState::Closed);

    // history resolves and a frame arrives after the teardown
    drop(release);
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 2, 2))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.controller.snapshot().await.is_empty());
    assert!(h.observer.snapshots().is_empty());
    assert!(h.observer.failures().is_empty());
}

#[tokio::test]
async fn teardown_completes_under_frame_flood() {
    let h = harness();
    let room = room(415);
    h.controller.start_session(room.clone()).await.unwrap();
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    // far more frames than the inbound mailbox holds, so the teardown runs
    // against a reader that may be parked on a full mailbox
    for id in 1..=600 {
        h.gateway
            .push_chat(room.room_id, &live_frame(room.room_id, id, 1))
            .await
            .unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), h.controller.end_session())
        .await
        .expect("teardown must complete under inbound load");

    assert_eq!(h.controller.state().await, SessionState::Closed);
    assert!(h.controller.snapshot().await.is_empty());
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let h = harness();
    h.controller.start_session(room(408)).await.unwrap();
    h.controller.end_session().await;
    h.controller.end_session().await;
    assert_eq!(h.controller.state().await, SessionState::Closed);
}

#[tokio::test]
async fn remote_close_fails_session_and_restart_resumes() {
    let h = harness();
    let room = room(409);
    h.history.push(history_message(room.room_id, 1, 0));
    h.history.push(history_message(room.room_id, 2, 1));

    h.controller.start_session(room.clone()).await.unwrap();
    wait_for_ids(&h.controller, &[1, 2]).await;
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    h.gateway.kick(room.room_id).await;
    wait_for_state(&h.controller, SessionState::Failed).await;
    assert_eq!(h.observer.failures().len(), 1);
    // the timeline survives the failure
    assert_eq!(ids(&h.controller).await, vec![1, 2]);

    // a message sent while the connection was down
    h.history.push(history_message(room.room_id, 3, 4));
    h.controller.restart_session().await.unwrap();
    wait_for_ids(&h.controller, &[1, 2, 3]).await;

    // the resume fetch asked only for what came after the high-water mark
    let fetches = h.history.fetches();
    assert_eq!(fetches.last(), Some(&(room.room_id, Some(MessageId(2)))));
}

#[tokio::test]
async fn foreign_room_frame_ignored() {
    let h = harness();
    let room = room(410);
    h.controller.start_session(room.clone()).await.unwrap();
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    let mut stray = live_frame(room.room_id, 1, 1);
    stray.room = Some(RoomId(999));
    h.gateway.push_chat(room.room_id, &stray).await.unwrap();
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 2, 2))
        .await
        .unwrap();

    wait_for_ids(&h.controller, &[2]).await;
}

#[tokio::test]
async fn history_failure_degrades_to_live_only() {
    let h = harness();
    let room = room(411);
    h.history.set_failing(true);

    h.controller.start_session(room.clone()).await.unwrap();
    settle("history warning", || {
        !h.observer.history_warnings().is_empty()
    })
    .await;
    assert_eq!(h.observer.history_warnings().len(), 1);
    assert_eq!(h.controller.state().await, SessionState::Active);
    assert!(h.observer.failures().is_empty());

    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 7, 1))
        .await
        .unwrap();
    wait_for_ids(&h.controller, &[7]).await;
}

#[tokio::test]
async fn live_delivery_marks_room_read() {
    let h = harness();
    let room = room(412);
    h.controller.start_session(room.clone()).await.unwrap();
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;

    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 1, 1))
        .await
        .unwrap();
    wait_for_ids(&h.controller, &[1]).await;

    settle("mark-read call", || !h.read_tracker.calls().is_empty()).await;
    assert_eq!(h.read_tracker.calls(), vec![room.room_id]);
}

#[tokio::test]
async fn mark_read_failure_leaves_timeline_alone() {
    let h = harness();
    let room = room(413);
    h.read_tracker.set_failing(true);

    h.controller.start_session(room.clone()).await.unwrap();
    settle("subscriber", || {
        h.gateway.subscriber_count(room.room_id) == 1
    })
    .await;
    h.gateway
        .push_chat(room.room_id, &live_frame(room.room_id, 1, 1))
        .await
        .unwrap();
    wait_for_ids(&h.controller, &[1]).await;
    assert_eq!(h.controller.state().await, SessionState::Active);
}

#[tokio::test]
async fn room_accepts_one_session_at_a_time() {
    let first = harness();
    let second = harness();
    let room = room(414);

    first.controller.start_session(room.clone()).await.unwrap();
    let err = second.controller.start_session(room.clone()).await.unwrap_err();
    assert!(matches!(err, SessionError::RoomBusy(RoomId(414))));

    first.controller.end_session().await;
    second.controller.start_session(room.clone()).await.unwrap();
    assert_eq!(second.controller.state().await, SessionState::Active);
    second.controller.end_session().await;
}

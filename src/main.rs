use roomtalk::backend_fake::*;
use roomtalk::backend_http::*;
use roomtalk::connection::ConnectionFactory;
use roomtalk::domain_model::*;
use roomtalk::logger::*;
use roomtalk::session::SessionController;
use roomtalk::session_port::*;
use roomtalk::settings::*;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints each newly delivered message; the session feeds it the full
/// snapshot, so only the tail is new after a send echo or live push.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn timeline_changed(&self, snapshot: &[ChatMessage]) {
        if let Some(last) = snapshot.last() {
            println!(
                "[{}] {}: {}",
                last.sent_at.format("%Y-%m-%d %H:%M"),
                last.sender_name,
                last.body
            );
        }
    }

    fn session_failed(&self, fault: &SessionFault) {
        eprintln!("session failed: {fault} (restart to retry)");
    }

    fn history_unavailable(&self, reason: &HistoryFetchError) {
        eprintln!("history unavailable ({reason}); showing live messages only");
    }
}

struct Collaborators {
    factory: Arc<dyn ConnectionFactory>,
    history: Arc<dyn HistorySource>,
    read_tracker: Arc<dyn ReadTracker>,
    directory: Arc<dyn RoomDirectory>,
}

fn wire_fake(identity: ParticipantId, listing_id: ListingId) -> Collaborators {
    let gateway = Arc::new(FakeGateway::new());
    gateway.register_name(identity, "me");

    let directory = Arc::new(FakeRoomDirectory::new());
    directory.insert_room(Room {
        room_id: RoomId(1),
        counterpart: ParticipantId(identity.0 + 1),
        counterpart_name: "demo seller".to_string(),
        listing_id,
    });

    let history = Arc::new(FakeHistorySource::new());
    history.push(ChatMessage {
        message_id: MessageId(1),
        room_id: RoomId(1),
        sender: ParticipantId(identity.0 + 1),
        sender_name: "demo seller".to_string(),
        body: "Hi, the listing is still available.".to_string(),
        sent_at: chrono::Utc::now(),
        origin: DeliveryOrigin::History,
    });
    gateway.set_next_message_id(2);

    Collaborators {
        factory: gateway,
        history,
        read_tracker: Arc::new(RecordingReadTracker::new()),
        directory,
    }
}

fn wire_http(settings: &Settings, token: &AccessToken) -> Collaborators {
    let backend = Arc::new(HttpBackend::new(
        settings.gateway.api_url.clone(),
        token.clone(),
    ));
    Collaborators {
        factory: Arc::new(WsConnectionFactory::new(settings.gateway.ws_url.clone())),
        history: backend.clone(),
        read_tracker: backend.clone(),
        directory: backend,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    logger.reload(&project_settings.log.filter)?;

    let identity = ParticipantId(project_settings.identity.member_pk);
    let token = AccessToken(project_settings.identity.access_token.clone());
    let listing_id = ListingId(cli.listing.unwrap_or(1));

    let collaborators = match project_settings.chat.backend.as_str() {
        "fake" => wire_fake(identity, listing_id),
        "http" => wire_http(&project_settings, &token),
        other => return Err(anyhow::anyhow!("Unknown chat backend: {}", other)),
    };

    let rooms = collaborators.directory.list_rooms().await?;
    for room in &rooms {
        let marker = if room.unread { "*" } else { " " };
        println!(
            "{marker} room {}: {} | {}",
            room.room_id, room.counterpart_name, room.last_message
        );
    }

    let room = collaborators.directory.open_room(listing_id).await?;
    println!(
        "chatting with {} about listing {} (room {})",
        room.counterpart_name, room.listing_id, room.room_id
    );

    let controller = SessionController::new(
        identity,
        token,
        collaborators.factory,
        collaborators.history,
        collaborators.read_tracker,
        Arc::new(ConsoleObserver),
    );
    controller.start_session(room).await?;

    println!("type a message and press Enter; /quit to leave");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Err(e) = controller.send_message(line).await {
            eprintln!("send failed: {e}");
        }
    }

    controller.end_session().await;
    Ok(())
}

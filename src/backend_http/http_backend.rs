use crate::domain_model::*;
use crate::session_port::*;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

/// REST adapter for the marketplace chat backend. Paths and field names
/// follow the backend's wire contract (`*Pk` identifiers, `readYn` flags).
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: AccessToken) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.0)
    }
}

// region wire DTOs

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageHistoryItem {
    message_pk: i64,
    room_pk: i64,
    member_pk_from: i64,
    member_name_from: String,
    message: String,
    message_at: DateTime<Utc>,
}

impl MessageHistoryItem {
    fn into_message(self) -> ChatMessage {
        ChatMessage {
            message_id: MessageId(self.message_pk),
            room_id: RoomId(self.room_pk),
            sender: ParticipantId(self.member_pk_from),
            sender_name: self.member_name_from,
            body: self.message,
            sent_at: self.message_at,
            origin: DeliveryOrigin::History,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenRoomRequest {
    post_pk: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenRoomResponse {
    room_pk: i64,
    member_pk: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomListItem {
    chatting_room_pk: i64,
    message: String,
    message_at: Option<DateTime<Utc>>,
    chat_with: i64,
    chat_with_nickname: String,
    read_yn: String,
    post_pk: i64,
}

impl RoomListItem {
    fn into_summary(self) -> RoomSummary {
        RoomSummary {
            room_id: RoomId(self.chatting_room_pk),
            listing_id: ListingId(self.post_pk),
            counterpart: ParticipantId(self.chat_with),
            counterpart_name: self.chat_with_nickname,
            last_message: self.message,
            last_message_at: self.message_at,
            unread: self.read_yn.eq_ignore_ascii_case("n"),
        }
    }
}

// endregion

#[async_trait::async_trait]
impl HistorySource for HttpBackend {
    async fn fetch(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, HistoryFetchError> {
        let url = format!("{}/api/chatting/getMessageList", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("roomPk", room_id.0)])
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| HistoryFetchError::Service(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(HistoryFetchError::RoomNotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HistoryFetchError::Forbidden),
            status if !status.is_success() => Err(HistoryFetchError::Service(format!(
                "unexpected status {status}"
            ))),
            _ => {
                let items: Vec<MessageHistoryItem> = response
                    .json()
                    .await
                    .map_err(|e| HistoryFetchError::Service(e.to_string()))?;
                // the backend has no cursor parameter; resume filtering is ours
                Ok(items
                    .into_iter()
                    .map(MessageHistoryItem::into_message)
                    .filter(|m| after.is_none_or(|after| m.message_id > after))
                    .collect())
            }
        }
    }
}

#[async_trait::async_trait]
impl ReadTracker for HttpBackend {
    async fn mark_read(&self, room_id: RoomId) -> Result<(), ReadTrackError> {
        let url = format!("{}/messageRead/{}", self.base_url, room_id);
        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| ReadTrackError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReadTrackError::Service(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RoomDirectory for HttpBackend {
    async fn open_room(&self, listing_id: ListingId) -> Result<Room, RoomOpenError> {
        let url = format!("{}/api/chatting/openChattingRoom", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer())
            .json(&OpenRoomRequest {
                post_pk: listing_id.0,
            })
            .send()
            .await
            .map_err(|e| RoomOpenError::Service(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RoomOpenError::ListingNotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RoomOpenError::Forbidden),
            status if !status.is_success() => {
                Err(RoomOpenError::Service(format!("unexpected status {status}")))
            }
            _ => {
                let opened: OpenRoomResponse = response
                    .json()
                    .await
                    .map_err(|e| RoomOpenError::Service(e.to_string()))?;
                Ok(Room {
                    room_id: RoomId(opened.room_pk),
                    counterpart: ParticipantId(opened.member_pk),
                    // nickname arrives with the room list, not here
                    counterpart_name: String::new(),
                    listing_id,
                })
            }
        }
    }

    async fn list_rooms(&self) -> Result<Vec<RoomSummary>, RoomOpenError> {
        let url = format!("{}/api/chatting/getAllChattingRoomList", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| RoomOpenError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RoomOpenError::Service(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        let items: Vec<RoomListItem> = response
            .json()
            .await
            .map_err(|e| RoomOpenError::Service(e.to_string()))?;
        Ok(items.into_iter().map(RoomListItem::into_summary).collect())
    }
}

use roomtalk::connection::ClientFrame;
use roomtalk::domain_model::{ListingId, RoomId};

fn main() {
    let subscribe = ClientFrame::Subscribe { room: RoomId(42) };
    println!("{}", serde_json::to_string(&subscribe).unwrap());

    let send = ClientFrame::Send {
        room: RoomId(42),
        listing: ListingId(7),
        body: "Hello".to_string(),
    };
    println!("{}", serde_json::to_string(&send).unwrap());
}

//! Channel naming and event classification.
//!
//! Channel names encode the routing target:
//! - `viewport:<client_id>` → only that client
//! - `roamchan` → every client
//! - `place:<place_id>` → every client, decorated with place properties
//!
//! Names are decoded once at ingestion into a [`GeoEvent`].

use crate::client::ClientId;
use tile38_client::ChannelMessage;

pub const VIEWPORT_PREFIX: &str = "viewport:";
pub const PLACE_PREFIX: &str = "place:";
pub const ROAM_CHANNEL: &str = "roamchan";

/// Patterns the relay subscribes to.
pub fn subscribe_patterns() -> Vec<String> {
    vec![
        format!("{}*", VIEWPORT_PREFIX),
        ROAM_CHANNEL.to_string(),
        format!("{}*", PLACE_PREFIX),
    ]
}

pub fn viewport_channel(client_id: &str) -> String {
    format!("{}{}", VIEWPORT_PREFIX, client_id)
}

pub fn place_channel(place_id: &str) -> String {
    format!("{}{}", PLACE_PREFIX, place_id)
}

/// Where a broadcast event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Roaming,
    Place(String),
    /// Any other channel the patterns happen to match.
    Other(String),
}

/// A backend event with its routing decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoEvent {
    /// Deliver to one client only.
    Targeted { client_id: ClientId, payload: Vec<u8> },
    /// Deliver to every registered client.
    Broadcast { source: EventSource, payload: Vec<u8> },
}

impl GeoEvent {
    pub fn decode(msg: ChannelMessage) -> Self {
        let ChannelMessage { channel, payload } = msg;

        if let Some(client_id) = channel.strip_prefix(VIEWPORT_PREFIX) {
            return GeoEvent::Targeted {
                client_id: client_id.to_string(),
                payload,
            };
        }

        let source = if channel == ROAM_CHANNEL {
            EventSource::Roaming
        } else if let Some(place) = channel.strip_prefix(PLACE_PREFIX) {
            EventSource::Place(place.to_string())
        } else {
            EventSource::Other(channel)
        };
        GeoEvent::Broadcast { source, payload }
    }
}

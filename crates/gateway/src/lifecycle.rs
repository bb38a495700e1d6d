//! Connect/disconnect hooks.

use crate::client::ClientState;
use crate::error::Result;
use crate::places::{PEOPLE_COLLECTION, PLACES_COLLECTION};
use crate::protocol::ServerMessage;
use crate::subscription::viewport_channel;
use crate::ws_server::AppState;
use metrics::counter;
use tracing::{debug, warn};

/// Announce the client's ID, then push every stored place so the map can be
/// drawn before any live event arrives.
pub async fn on_open(state: &AppState, client: &ClientState) -> Result<()> {
    client.send(ServerMessage::Id {
        id: client.id.clone(),
    })?;

    let places = state.store.scan(PLACES_COLLECTION).await?;
    for place in &places {
        if !client.try_send_text(&place.object) {
            debug!("Client {} is not accepting place {}", client.id, place.id);
        }
    }
    debug!("Sent {} places to client {}", places.len(), client.id);
    Ok(())
}

/// Remove the client's viewport fence and person record. Safe to call
/// repeatedly and for clients that never sent anything.
pub async fn on_close(state: &AppState, client_id: &str) {
    let channel = viewport_channel(client_id);
    if let Err(e) = state.store.del_channel(&channel).await {
        counter!("relay_backend_errors_total").increment(1);
        warn!("Failed to delete channel {}: {}", channel, e);
    }
    if let Err(e) = state.store.del_object(PEOPLE_COLLECTION, client_id).await {
        counter!("relay_backend_errors_total").increment(1);
        warn!("Failed to delete person {}: {}", client_id, e);
    }
}

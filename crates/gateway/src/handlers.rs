//! Handlers for inbound client messages.
//!
//! Failures are returned to the connection loop, which logs them. Nothing
//! is echoed back to the client.

use crate::client::ClientState;
use crate::error::Result;
use crate::places::PEOPLE_COLLECTION;
use crate::protocol::{set_via, ChatFeature, ClientMessage, ViewportData};
use crate::subscription::viewport_channel;
use crate::ws_server::AppState;
use metrics::counter;
use serde_json::Value;
use tile38_client::{Area, Detect, FenceSpec, SearchKind};
use tracing::debug;

/// Parse and handle one text frame.
pub async fn handle_text(state: &AppState, client: &ClientState, text: &str) -> Result<()> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Viewport { data } => viewport(state, client, data).await,
        ClientMessage::Feature { .. } => feature(state, client, text).await,
        ClientMessage::Message { feature } => {
            let delivered = chat(state, text, &feature).await?;
            debug!("Chat from {} delivered to {} clients", client.id, delivered);
            Ok(())
        }
    }
}

/// Declare or replace the client's viewport fence. Only `inside` events for
/// this rectangle are streamed, and only to this client.
pub async fn viewport(state: &AppState, client: &ClientState, data: ViewportData) -> Result<()> {
    let fence = FenceSpec::new(
        SearchKind::Intersects,
        PEOPLE_COLLECTION,
        Area::Bounds(data.into()),
    )
    .detect(&[Detect::Inside]);
    state
        .store
        .set_channel(&viewport_channel(&client.id), &fence)
        .await?;
    Ok(())
}

/// Store or refresh the client's person record with the payload verbatim.
pub async fn feature(state: &AppState, client: &ClientState, raw: &str) -> Result<()> {
    state
        .store
        .set_object(PEOPLE_COLLECTION, &client.id, raw, Some(state.person_ttl))
        .await?;
    Ok(())
}

/// Deliver a chat message to everyone co-located with its sender, tagging
/// each copy with why that recipient matched. Returns the delivery count.
pub async fn chat(state: &AppState, raw: &str, feature: &ChatFeature) -> Result<usize> {
    let (x, y) = feature.position()?;
    let recipients = state.aggregator.resolve(x, y).await?;
    counter!("relay_chat_messages_total").increment(1);

    let original: Value = serde_json::from_str(raw)?;
    let mut delivered = 0;
    for (client_id, via) in recipients {
        let Some(recipient) = state.registry.get(&client_id) else {
            continue;
        };
        let mut message = original.clone();
        set_via(&mut message, &via)?;
        if recipient.try_send_text(&serde_json::to_string(&message)?) {
            delivered += 1;
        }
    }
    Ok(delivered)
}

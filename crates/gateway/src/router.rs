//! Event relay: Tile38 channels → WebSocket fan-out.
//!
//! One task owns the subscription connection and runs [`EventRelay::run`]
//! for the life of the process. Events are dispatched inline, one at a
//! time, so each client sees them in the order Tile38 published them.

use crate::client::ClientRegistry;
use crate::error::Result;
use crate::places::PlaceProps;
use crate::subscription::{subscribe_patterns, EventSource, GeoEvent};
use futures::StreamExt;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tile38_client::{ChannelMessage, ChannelSubscriber};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Re-subscribe timing.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Routes Tile38 fence events to WebSocket clients.
pub struct EventRelay {
    registry: Arc<ClientRegistry>,
    props: Arc<PlaceProps>,
    policy: ReconnectPolicy,
}

impl EventRelay {
    pub fn new(
        registry: Arc<ClientRegistry>,
        props: Arc<PlaceProps>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            registry,
            props,
            policy,
        }
    }

    /// Subscribe and relay until shutdown, re-subscribing whenever the
    /// subscription is lost. Events published while disconnected are lost.
    pub async fn run(
        self: Arc<Self>,
        subscriber: Arc<dyn ChannelSubscriber>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        let patterns = subscribe_patterns();
        let mut delay = self.policy.initial_delay;

        loop {
            let subscribed = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                subscribed = subscriber.psubscribe(&patterns) => subscribed,
            };

            match subscribed {
                Ok(mut stream) => {
                    delay = self.policy.initial_delay;
                    info!("EventRelay subscribed to {:?}", patterns);
                    loop {
                        tokio::select! {
                            biased;

                            _ = shutdown_rx.recv() => {
                                info!("EventRelay received shutdown signal");
                                return Ok(());
                            }

                            msg = stream.next() => match msg {
                                Some(msg) => {
                                    self.handle_message(msg);
                                }
                                None => {
                                    warn!("Tile38 subscription ended, re-subscribing");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to subscribe to Tile38: {}, retrying in {:?}", e, delay);
                }
            }

            counter!("relay_subscription_reconnects_total").increment(1);
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(self.policy.max_delay);
        }

        info!("EventRelay stopped");
        Ok(())
    }

    /// Decode and deliver one channel message. Returns the number of clients
    /// that accepted it.
    pub fn handle_message(&self, msg: ChannelMessage) -> usize {
        counter!("relay_events_received_total").increment(1);
        self.dispatch(GeoEvent::decode(msg))
    }

    pub fn dispatch(&self, event: GeoEvent) -> usize {
        match event {
            GeoEvent::Targeted { client_id, payload } => {
                let Some(text) = payload_text(payload) else {
                    return 0;
                };
                let Some(client) = self.registry.get(&client_id) else {
                    debug!("Viewport event for departed client {}", client_id);
                    counter!("relay_events_dropped_total").increment(1);
                    return 0;
                };
                counter!("relay_events_targeted_total").increment(1);
                if client.try_send_text(&text) {
                    1
                } else {
                    debug!("Failed to send to client {}", client_id);
                    counter!("relay_events_dropped_total").increment(1);
                    0
                }
            }
            GeoEvent::Broadcast { source, payload } => {
                let Some(text) = payload_text(payload) else {
                    return 0;
                };
                let text = self.decorate(&source, text);
                counter!("relay_events_broadcast_total").increment(1);
                let delivered = self.registry.broadcast_text(&text);
                debug!("Broadcast {:?} event to {} clients", source, delivered);
                delivered
            }
        }
    }

    /// Replace `properties` with the cached place properties.
    fn decorate(&self, source: &EventSource, text: String) -> String {
        let EventSource::Place(place_id) = source else {
            return text;
        };
        let Some(props) = self.props.get(place_id) else {
            return text;
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(mut event)) => {
                event.insert("properties".to_string(), props.clone());
                match serde_json::to_string(&event) {
                    Ok(decorated) => decorated,
                    Err(e) => {
                        warn!("Failed to re-serialize event for {}: {}", place_id, e);
                        text
                    }
                }
            }
            _ => {
                warn!("Event on place {} is not a JSON object, relaying as is", place_id);
                text
            }
        }
    }
}

fn payload_text(payload: Vec<u8>) -> Option<String> {
    match String::from_utf8(payload) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Dropping non utf-8 event payload: {}", e);
            counter!("relay_events_dropped_total").increment(1);
            None
        }
    }
}

//! WebSocket server using Axum.

use crate::aggregator::QueryAggregator;
use crate::client::{ClientRegistry, ClientState, CLIENT_CHANNEL_BUFFER_SIZE};
use crate::error::{GatewayError, Result};
use crate::handlers::handle_text;
use crate::lifecycle::{on_close, on_open};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tile38_client::GeoStore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::interval;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state.
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub store: Arc<dyn GeoStore>,
    pub aggregator: QueryAggregator,
    /// Lifetime of a person record without a refresh.
    pub person_ttl: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<ClientRegistry>,
        store: Arc<dyn GeoStore>,
        roam_meters: f64,
        person_ttl: Duration,
    ) -> Self {
        Self {
            aggregator: QueryAggregator::new(store.clone(), roam_meters),
            registry,
            store,
            person_ttl,
        }
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.registry.client_count(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection from upgrade to teardown.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Bounded so a stalled client drops messages instead of growing memory
    let (tx, mut rx) = mpsc::channel::<Message>(CLIENT_CHANNEL_BUFFER_SIZE);

    let client = Arc::new(ClientState::new(tx));
    let client_id = client.id.clone();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Queue the ID and places before registering, so no relayed event can
    // overtake them
    if let Err(e) = on_open(&state, &client).await {
        warn!("Failed to greet client {}: {}", client_id, e);
    }
    state.registry.insert(client.clone());

    counter!("relay_connections_total").increment(1);
    gauge!("relay_active_connections").set(state.registry.client_count() as f64);

    let mut ping_interval = interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately
    ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_message(&state, &client, msg).await {
                            warn!("Error handling message from {}: {}", client_id, e);
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                let ping = Message::Ping(Vec::new().into());
                if let Err(TrySendError::Closed(_)) = client.tx.try_send(ping) {
                    break;
                }
            }
        }
    }

    state.registry.remove(&client_id);
    on_close(&state, &client_id).await;
    send_task.abort();

    counter!("relay_disconnections_total").increment(1);
    gauge!("relay_active_connections").set(state.registry.client_count() as f64);
}

async fn handle_message(state: &AppState, client: &ClientState, msg: Message) -> Result<()> {
    match msg {
        Message::Text(text) => handle_text(state, client, text.as_str()).await,
        Message::Binary(data) => {
            let text = std::str::from_utf8(&data)
                .map_err(|e| GatewayError::InvalidMessage(e.to_string()))?;
            handle_text(state, client, text).await
        }
        Message::Ping(data) => {
            client.tx.try_send(Message::Pong(data))?;
            Ok(())
        }
        Message::Pong(_) | Message::Close(_) => Ok(()),
    }
}

#[cfg(test)]
pub(crate) fn test_state(store: Arc<dyn GeoStore>) -> AppState {
    AppState::new(
        Arc::new(ClientRegistry::new()),
        store,
        100.0,
        Duration::from_secs(5),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::{bootstrap, PlaceProps, PEOPLE_COLLECTION};
    use crate::router::{EventRelay, ReconnectPolicy};
    use crate::subscription::{viewport_channel, ROAM_CHANNEL};
    use crate::test_support::{person_feature, square_place, MemoryStore};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use futures::Stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tile38_client::{Area, ChannelMessage, FenceSpec, SearchKind, StoredObject};
    use tokio::net::TcpListener;
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::{connect_async, tungstenite};

    /// MemoryStore whose `scan` blocks until released.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        scanning: AtomicBool,
        release: Notify,
    }

    #[async_trait]
    impl GeoStore for GatedStore {
        async fn set_object(
            &self,
            collection: &str,
            id: &str,
            object: &str,
            ttl: Option<Duration>,
        ) -> tile38_client::Result<()> {
            self.inner.set_object(collection, id, object, ttl).await
        }

        async fn del_object(&self, collection: &str, id: &str) -> tile38_client::Result<()> {
            self.inner.del_object(collection, id).await
        }

        async fn set_channel(&self, name: &str, fence: &FenceSpec) -> tile38_client::Result<()> {
            self.inner.set_channel(name, fence).await
        }

        async fn del_channel(&self, name: &str) -> tile38_client::Result<()> {
            self.inner.del_channel(name).await
        }

        async fn scan(&self, collection: &str) -> tile38_client::Result<Vec<StoredObject>> {
            self.scanning.store(true, Ordering::SeqCst);
            self.release.notified().await;
            self.inner.scan(collection).await
        }

        async fn search_ids(
            &self,
            kind: SearchKind,
            collection: &str,
            area: &Area,
        ) -> tile38_client::Result<Vec<String>> {
            self.inner.search_ids(kind, collection, area).await
        }
    }

    async fn eventually(mut done: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !done() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: Stream<Item = std::result::Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    {
        loop {
            match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
                Some(Ok(tungstenite::Message::Text(t))) => return t.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame {:?}", other),
            }
        }
    }

    fn roam_event(payload: &str) -> ChannelMessage {
        ChannelMessage {
            channel: ROAM_CHANNEL.to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_health_reports_client_count() {
        let state = Arc::new(test_state(Arc::new(MemoryStore::new())));
        let (tx, _rx) = mpsc::channel(1);
        state.registry.insert(Arc::new(ClientState::new(tx)));

        let response = health_handler(State(state)).await.into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"status": "ok", "clients": 1}));
    }

    #[tokio::test]
    async fn test_binary_frames_are_handled_as_text() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone());
        let (tx, _rx) = mpsc::channel(1);
        let client = ClientState::new(tx);

        let raw = crate::test_support::person_feature(1.0, 1.0);
        handle_message(&state, &client, Message::Binary(raw.clone().into_bytes().into()))
            .await
            .unwrap();
        assert_eq!(store.object("people", &client.id), Some(raw));

        let err = handle_message(&state, &client, Message::Binary(vec![0xff, 0xfe].into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn test_socket_sends_places_before_live_events_and_tears_down() {
        let store = Arc::new(GatedStore::default());
        bootstrap(
            &store.inner,
            &[square_place("hall-a", 39.740, -105.000, 39.743, -104.993)],
            100.0,
        )
        .await;
        let state = Arc::new(test_state(store.clone()));
        let relay = EventRelay::new(
            state.registry.clone(),
            Arc::new(PlaceProps::default()),
            ReconnectPolicy::default(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });

        let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

        // While places are still loading the client is not a relay target
        eventually(|| store.scanning.load(Ordering::SeqCst)).await;
        assert_eq!(relay.handle_message(roam_event(r#"{"live":0}"#)), 0);
        store.release.notify_one();

        eventually(|| state.registry.client_count() == 1).await;
        assert_eq!(relay.handle_message(roam_event(r#"{"live":1}"#)), 1);

        let id: serde_json::Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(id["type"], "ID");
        let client_id = id["id"].as_str().unwrap().to_string();
        let place: serde_json::Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(place["properties"]["name"], "hall-a");
        assert_eq!(next_text(&mut ws).await, r#"{"live":1}"#);

        let viewport = json!({
            "type": "Viewport",
            "data": {"_sw": {"lat": 0, "lng": 0}, "_ne": {"lat": 1, "lng": 1}}
        });
        ws.send(tungstenite::Message::Text(viewport.to_string().into()))
            .await
            .unwrap();
        ws.send(tungstenite::Message::Text(person_feature(39.741, -104.999).into()))
            .await
            .unwrap();
        eventually(|| store.inner.object(PEOPLE_COLLECTION, &client_id).is_some()).await;
        assert!(store.inner.channel(&viewport_channel(&client_id)).is_some());

        ws.close(None).await.unwrap();

        eventually(|| {
            state.registry.client_count() == 0
                && store.inner.object(PEOPLE_COLLECTION, &client_id).is_none()
                && store.inner.channel(&viewport_channel(&client_id)).is_none()
        })
        .await;
    }
}

//! Geofence notification relay.
//!
//! This service:
//! - Accepts WebSocket connections and assigns each an ID
//! - Stores each client's location and viewport as Tile38 objects/fences
//! - Subscribes to Tile38 fence channels and relays events to clients
//! - Delivers chat messages to everyone co-located with the sender
//!
//! ## Architecture
//!
//! ```text
//! Tile38: PSUBSCRIBE viewport:* roamchan place:*
//!         ↓
//! EventRelay (decodes channel → GeoEvent)
//!         ↓
//! ClientRegistry (DashMap)
//!         ↓
//! WebSocket clients ──Viewport/Feature/Message──→ handlers ──→ Tile38
//! ```

pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod places;
pub mod protocol;
pub mod router;
pub mod subscription;
pub mod ws_server;

#[cfg(test)]
mod test_support;

pub use aggregator::{QueryAggregator, Recipients};
pub use client::{ClientId, ClientRegistry, ClientState};
pub use config::RelayConfig;
pub use error::{GatewayError, Result};
pub use places::{bootstrap, load_fixtures, PlaceProps};
pub use protocol::{ClientMessage, ServerMessage};
pub use router::{EventRelay, ReconnectPolicy};
pub use subscription::GeoEvent;
pub use ws_server::{create_router, AppState};

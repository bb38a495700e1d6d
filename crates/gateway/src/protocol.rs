//! WebSocket protocol message types.
//!
//! Inbound messages are JSON objects tagged by `type`. Location updates are
//! GeoJSON Features, so their `type` doubles as the message tag and the
//! original text is stored verbatim.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tile38_client::{Bounds, Point};

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Message sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// The client's visible map rectangle.
    Viewport { data: ViewportData },
    /// Location update; a GeoJSON Feature.
    Feature {
        #[serde(default)]
        geometry: Option<Value>,
    },
    /// Chat message sent from a location.
    Message { feature: ChatFeature },
}

/// Map corner as reported by the browser map widget.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<LatLng> for Point {
    fn from(ll: LatLng) -> Self {
        Point::new(ll.lat, ll.lng)
    }
}

/// Viewport rectangle.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ViewportData {
    #[serde(rename = "_sw", alias = "sw")]
    pub sw: LatLng,
    #[serde(rename = "_ne", alias = "ne")]
    pub ne: LatLng,
}

impl From<ViewportData> for Bounds {
    fn from(v: ViewportData) -> Self {
        Bounds::new(v.sw.into(), v.ne.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatFeature {
    pub geometry: ChatGeometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatGeometry {
    pub coordinates: Vec<f64>,
}

impl ChatFeature {
    /// `(x, y)` i.e. `(lng, lat)` of the sender.
    pub fn position(&self) -> Result<(f64, f64)> {
        match self.geometry.coordinates.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(GatewayError::InvalidMessage(
                "feature.geometry.coordinates needs two numbers".into(),
            )),
        }
    }
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Message generated by the server itself. Backend events are relayed as
/// raw text and never go through this type.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Connection identity, sent once right after connect.
    #[serde(rename = "ID")]
    Id { id: String },
}

/// Set `feature.properties.via` on a chat message, creating the
/// `properties` object when absent.
pub fn set_via(message: &mut Value, via: &[String]) -> Result<()> {
    let feature = message
        .get_mut("feature")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| GatewayError::InvalidMessage("feature must be an object".into()))?;

    let properties = feature
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if !properties.is_object() {
        *properties = Value::Object(Map::new());
    }
    if let Some(props) = properties.as_object_mut() {
        props.insert(
            "via".to_string(),
            Value::Array(via.iter().cloned().map(Value::String).collect()),
        );
    }
    Ok(())
}

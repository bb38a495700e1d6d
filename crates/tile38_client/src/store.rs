//! The command surface the relay needs from a geospatial store.

use crate::client::ChannelStream;
use crate::command::{Area, FenceSpec, SearchKind};
use crate::error::Result;
use crate::reply::StoredObject;
use async_trait::async_trait;
use std::time::Duration;

/// Request/response operations against the geofencing backend.
///
/// Implemented by [`crate::Tile38Client`]. Every call is independent: no
/// transactions and no pipelining.
#[async_trait]
pub trait GeoStore: Send + Sync {
    /// `SET collection id [EX ttl] OBJECT object`
    async fn set_object(
        &self,
        collection: &str,
        id: &str,
        object: &str,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// `DEL collection id`. Deleting a missing object is not an error.
    async fn del_object(&self, collection: &str, id: &str) -> Result<()>;

    /// `SETCHAN name <fence>`, replacing any channel with the same name.
    async fn set_channel(&self, name: &str, fence: &FenceSpec) -> Result<()>;

    /// `DELCHAN name`. Deleting a missing channel is not an error.
    async fn del_channel(&self, name: &str) -> Result<()>;

    /// Every object in a collection.
    async fn scan(&self, collection: &str) -> Result<Vec<StoredObject>>;

    /// IDs of the objects in `collection` matching a spatial search.
    async fn search_ids(
        &self,
        kind: SearchKind,
        collection: &str,
        area: &Area,
    ) -> Result<Vec<String>>;
}

/// Source of pattern-subscribed channel messages.
///
/// Each call opens a fresh subscription; the returned stream ends when that
/// subscription's connection is lost.
#[async_trait]
pub trait ChannelSubscriber: Send + Sync {
    async fn psubscribe(&self, patterns: &[String]) -> Result<ChannelStream>;
}

//! Tile38 client library.
//!
//! Tile38 speaks the Redis protocol, so this wraps the `redis` crate:
//! - a bounded `r2d2` pool for one-shot commands (`SET`, `DEL`, `SETCHAN`,
//!   `DELCHAN`, `SCAN`, `INTERSECTS`, `WITHIN`, `NEARBY`)
//! - a dedicated async connection for `PSUBSCRIBE` streams
//!
//! # Example
//!
//! ```ignore
//! use tile38_client::{Area, GeoStore, PoolConfig, SearchKind, Tile38Client};
//!
//! let tile38 = Tile38Client::new("redis://127.0.0.1:9851", &PoolConfig::default())?;
//! let ids = tile38
//!     .search_ids(SearchKind::Intersects, "people", &Area::Get {
//!         collection: "places".into(),
//!         id: "hyatt-regency".into(),
//!     })
//!     .await?;
//! ```

pub mod client;
pub mod command;
pub mod error;
pub mod reply;
pub mod store;

pub use client::{ChannelMessage, ChannelStream, PoolConfig, Tile38Client};
pub use command::{Area, Bounds, Detect, FenceSpec, Point, SearchKind};
pub use error::{Error, Result};
pub use reply::StoredObject;
pub use store::{ChannelSubscriber, GeoStore};

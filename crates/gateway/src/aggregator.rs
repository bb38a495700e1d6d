//! Recipient resolution for chat messages.
//!
//! A person is "co-located" with a point when they share a place with it or
//! are within the roaming radius of it. Each match contributes a label:
//! the place ID, or [`ROAMING_LABEL`]. Place labels come first.

use crate::client::ClientId;
use crate::error::{GatewayError, Result};
use crate::places::{PEOPLE_COLLECTION, PLACES_COLLECTION};
use std::collections::HashMap;
use std::sync::Arc;
use tile38_client::{Area, Bounds, GeoStore, Point, SearchKind};
use tracing::debug;

/// Label for proximity matches.
pub const ROAMING_LABEL: &str = "roaming";

/// Person ID → match labels in discovery order.
pub type Recipients = HashMap<ClientId, Vec<String>>;

pub struct QueryAggregator {
    store: Arc<dyn GeoStore>,
    roam_meters: f64,
}

impl QueryAggregator {
    pub fn new(store: Arc<dyn GeoStore>, roam_meters: f64) -> Self {
        Self { store, roam_meters }
    }

    /// Resolve who is co-located with `(x, y)` = `(lng, lat)`.
    ///
    /// Any failed lookup aborts the whole resolution.
    pub async fn resolve(&self, x: f64, y: f64) -> Result<Recipients> {
        let point = Point::new(y, x);
        let mut recipients = Recipients::new();

        let places = self
            .store
            .search_ids(
                SearchKind::Intersects,
                PLACES_COLLECTION,
                &Area::Bounds(Bounds::point(point)),
            )
            .await
            .map_err(|source| GatewayError::Resolve {
                step: "place lookup",
                source,
            })?;

        for place_id in places {
            let people = self
                .store
                .search_ids(
                    SearchKind::Intersects,
                    PEOPLE_COLLECTION,
                    &Area::Get {
                        collection: PLACES_COLLECTION.to_string(),
                        id: place_id.clone(),
                    },
                )
                .await
                .map_err(|source| GatewayError::Resolve {
                    step: "people in place lookup",
                    source,
                })?;
            for person in people {
                recipients.entry(person).or_default().push(place_id.clone());
            }
        }

        let nearby = self
            .store
            .search_ids(
                SearchKind::Nearby,
                PEOPLE_COLLECTION,
                &Area::Point {
                    point,
                    meters: self.roam_meters,
                },
            )
            .await
            .map_err(|source| GatewayError::Resolve {
                step: "nearby lookup",
                source,
            })?;
        for person in nearby {
            recipients
                .entry(person)
                .or_default()
                .push(ROAMING_LABEL.to_string());
        }

        debug!("Resolved {} recipients near ({}, {})", recipients.len(), x, y);
        Ok(recipients)
    }
}

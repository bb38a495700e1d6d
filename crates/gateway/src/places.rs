//! Static places: fixture loading, startup fences and the props map.

use crate::error::{GatewayError, Result};
use crate::subscription::{place_channel, ROAM_CHANNEL};
use metrics::counter;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tile38_client::{Area, Detect, FenceSpec, GeoStore, SearchKind};
use tracing::{info, warn};

/// Collection holding the static places.
pub const PLACES_COLLECTION: &str = "places";

/// Collection holding one point per connected person.
pub const PEOPLE_COLLECTION: &str = "people";

/// A place read from `<fences_dir>/<id>.geo.json`.
#[derive(Debug, Clone)]
pub struct PlaceFixture {
    pub id: String,
    /// Raw GeoJSON, stored in Tile38 verbatim.
    pub geojson: String,
    /// The fixture's `properties` member (`null` when absent).
    pub properties: Value,
}

impl PlaceFixture {
    pub fn parse(id: impl Into<String>, geojson: String) -> Result<Self> {
        let parsed: Value = serde_json::from_str(&geojson)?;
        let properties = parsed.get("properties").cloned().unwrap_or(Value::Null);
        Ok(Self {
            id: id.into(),
            geojson,
            properties,
        })
    }
}

/// Read fixtures for the configured places. Unreadable or malformed
/// fixtures are logged and skipped.
pub fn load_fixtures(dir: &Path, places: &[String]) -> Vec<PlaceFixture> {
    let mut fixtures = Vec::with_capacity(places.len());
    for place in places {
        let path = dir.join(format!("{}.geo.json", place));
        let loaded = std::fs::read_to_string(&path)
            .map_err(GatewayError::from)
            .and_then(|geojson| PlaceFixture::parse(place.clone(), geojson));
        match loaded {
            Ok(fixture) => fixtures.push(fixture),
            Err(e) => warn!("Skipping place {} ({}): {}", place, path.display(), e),
        }
    }
    fixtures
}

/// Place ID → display properties. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PlaceProps {
    props: HashMap<String, Value>,
}

impl PlaceProps {
    pub fn from_fixtures(fixtures: &[PlaceFixture]) -> Self {
        Self {
            props: fixtures
                .iter()
                .map(|f| (f.id.clone(), f.properties.clone()))
                .collect(),
        }
    }

    pub fn get(&self, place_id: &str) -> Option<&Value> {
        self.props.get(place_id)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

/// Fence that reports people entering or leaving a place.
pub fn place_fence(fixture: &PlaceFixture) -> FenceSpec {
    FenceSpec::new(
        SearchKind::Within,
        PEOPLE_COLLECTION,
        Area::Object(fixture.geojson.clone()),
    )
    .detect(&[Detect::Enter, Detect::Exit])
}

/// Fence that reports people coming near each other.
pub fn roam_fence(meters: f64) -> FenceSpec {
    FenceSpec::new(
        SearchKind::Nearby,
        PEOPLE_COLLECTION,
        Area::Roam {
            collection: PEOPLE_COLLECTION.to_string(),
            pattern: "*".to_string(),
            meters,
        },
    )
}

/// Store every place, declare its channel and the roaming channel.
///
/// Backend failures are logged and do not stop startup; the props map is
/// built from the fixtures regardless.
pub async fn bootstrap(
    store: &dyn GeoStore,
    fixtures: &[PlaceFixture],
    roam_meters: f64,
) -> PlaceProps {
    for fixture in fixtures {
        if let Err(e) = store
            .set_object(PLACES_COLLECTION, &fixture.id, &fixture.geojson, None)
            .await
        {
            counter!("relay_backend_errors_total").increment(1);
            warn!("Failed to store place {}: {}", fixture.id, e);
        }
        let channel = place_channel(&fixture.id);
        if let Err(e) = store.set_channel(&channel, &place_fence(fixture)).await {
            counter!("relay_backend_errors_total").increment(1);
            warn!("Failed to declare channel {}: {}", channel, e);
        }
    }

    if let Err(e) = store.set_channel(ROAM_CHANNEL, &roam_fence(roam_meters)).await {
        counter!("relay_backend_errors_total").increment(1);
        warn!("Failed to declare channel {}: {}", ROAM_CHANNEL, e);
    }

    info!(
        "Bootstrapped {} places and roaming channel ({} m)",
        fixtures.len(),
        roam_meters
    );
    PlaceProps::from_fixtures(fixtures)
}

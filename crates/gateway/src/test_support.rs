//! In-memory stand-in for Tile38, for unit tests.
//!
//! Places are treated as their bounding boxes, people as points, and
//! NEARBY uses haversine distance. Expiry follows tokio's clock so tests
//! can run with a paused timer.

use crate::places::PlaceFixture;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tile38_client::{Area, Error, FenceSpec, GeoStore, Result, SearchKind, StoredObject};
use tokio::time::Instant;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

impl Rect {
    fn intersects(&self, other: &Rect) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

struct Entry {
    raw: String,
    rect: Rect,
    expires: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires.map_or(true, |at| now < at)
    }
}

fn invalid(msg: &str) -> Error {
    Error::InvalidReply(msg.to_string())
}

/// Bounding box of a GeoJSON Feature or geometry.
fn bbox(object: &Value) -> Option<Rect> {
    let geometry = if object.get("type")? == "Feature" {
        object.get("geometry")?
    } else {
        object
    };
    let mut coords = Vec::new();
    collect_positions(geometry.get("coordinates")?, &mut coords);
    let first = coords.first()?;
    let mut rect = Rect {
        min_lat: first.1,
        min_lon: first.0,
        max_lat: first.1,
        max_lon: first.0,
    };
    for (lon, lat) in coords {
        rect.min_lat = rect.min_lat.min(lat);
        rect.max_lat = rect.max_lat.max(lat);
        rect.min_lon = rect.min_lon.min(lon);
        rect.max_lon = rect.max_lon.max(lon);
    }
    Some(rect)
}

fn collect_positions(value: &Value, out: &mut Vec<(f64, f64)>) {
    if let Some(arr) = value.as_array() {
        if let (Some(lon), Some(lat)) = (
            arr.first().and_then(Value::as_f64),
            arr.get(1).and_then(Value::as_f64),
        ) {
            out.push((lon, lat));
        } else {
            for v in arr {
                collect_positions(v, out);
            }
        }
    }
}

fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Square polygon place fixture.
pub fn square_place(
    id: &str,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
) -> PlaceFixture {
    let geojson = json!({
        "type": "Feature",
        "properties": {"name": id},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [min_lon, min_lat],
                [max_lon, min_lat],
                [max_lon, max_lat],
                [min_lon, max_lat],
                [min_lon, min_lat]
            ]]
        }
    });
    PlaceFixture::parse(id, geojson.to_string()).expect("valid fixture")
}

/// Point feature as sent by a client location update.
pub fn person_feature(lat: f64, lon: f64) -> String {
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [lon, lat]},
        "properties": {"color": "red"}
    })
    .to_string()
}

/// In-memory GeoStore.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, Entry>>>,
    channels: Mutex<HashMap<String, FenceSpec>>,
    fail: AtomicBool,
    /// Fail only searches against this collection.
    fail_search_in: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_searches_in(&self, collection: &str) {
        *self.fail_search_in.lock().unwrap() = Some(collection.to_string());
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(invalid("backend unavailable"));
        }
        Ok(())
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.lock().unwrap().keys().cloned().collect()
    }

    pub fn channel(&self, name: &str) -> Option<FenceSpec> {
        self.channels.lock().unwrap().get(name).cloned()
    }

    /// Live object, if any.
    pub fn object(&self, collection: &str, id: &str) -> Option<String> {
        let now = Instant::now();
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|c| c.get(id))
            .filter(|e| e.live(now))
            .map(|e| e.raw.clone())
    }

    fn rect_of(&self, collection: &str, id: &str) -> Result<Rect> {
        let now = Instant::now();
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|c| c.get(id))
            .filter(|e| e.live(now))
            .map(|e| e.rect)
            .ok_or_else(|| invalid("key not found"))
    }
}

#[async_trait]
impl GeoStore for MemoryStore {
    async fn set_object(
        &self,
        collection: &str,
        id: &str,
        object: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.check()?;
        let parsed: Value = serde_json::from_str(object)?;
        let rect = bbox(&parsed).ok_or_else(|| invalid("invalid geometry"))?;
        let entry = Entry {
            raw: object.to_string(),
            rect,
            expires: ttl.map(|t| Instant::now() + t),
        };
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), entry);
        Ok(())
    }

    async fn del_object(&self, collection: &str, id: &str) -> Result<()> {
        self.check()?;
        if let Some(c) = self.collections.lock().unwrap().get_mut(collection) {
            c.remove(id);
        }
        Ok(())
    }

    async fn set_channel(&self, name: &str, fence: &FenceSpec) -> Result<()> {
        self.check()?;
        self.channels
            .lock()
            .unwrap()
            .insert(name.to_string(), fence.clone());
        Ok(())
    }

    async fn del_channel(&self, name: &str) -> Result<()> {
        self.check()?;
        self.channels.lock().unwrap().remove(name);
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Vec<StoredObject>> {
        self.check()?;
        let now = Instant::now();
        let collections = self.collections.lock().unwrap();
        let mut objects: Vec<StoredObject> = collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, e)| e.live(now))
                    .map(|(id, e)| StoredObject {
                        id: id.clone(),
                        object: e.raw.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        objects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(objects)
    }

    async fn search_ids(
        &self,
        kind: SearchKind,
        collection: &str,
        area: &Area,
    ) -> Result<Vec<String>> {
        self.check()?;
        if self.fail_search_in.lock().unwrap().as_deref() == Some(collection) {
            return Err(invalid("search failed"));
        }

        let now = Instant::now();
        let hit: Box<dyn Fn(&Rect) -> bool> = match (kind, area) {
            (SearchKind::Nearby, Area::Point { point, meters }) => {
                let (origin, radius) = ((point.lat, point.lon), *meters);
                Box::new(move |r: &Rect| haversine_m(origin, r.center()) <= radius)
            }
            (SearchKind::Intersects | SearchKind::Within, Area::Bounds(b)) => {
                let query = Rect {
                    min_lat: b.sw.lat.min(b.ne.lat),
                    min_lon: b.sw.lon.min(b.ne.lon),
                    max_lat: b.sw.lat.max(b.ne.lat),
                    max_lon: b.sw.lon.max(b.ne.lon),
                };
                Box::new(move |r: &Rect| r.intersects(&query))
            }
            (SearchKind::Intersects | SearchKind::Within, Area::Get { collection, id }) => {
                let query = self.rect_of(collection, id)?;
                Box::new(move |r: &Rect| r.intersects(&query))
            }
            _ => return Err(invalid("unsupported search")),
        };

        let collections = self.collections.lock().unwrap();
        let mut ids: Vec<String> = collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, e)| e.live(now) && hit(&e.rect))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

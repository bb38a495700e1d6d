//! Typed Tile38 command arguments.
//!
//! Tile38 speaks RESP, so every command is a flat list of string arguments.
//! The types here render the geometry/fence part of `SET`, `SETCHAN`,
//! `INTERSECTS`, `WITHIN` and `NEARBY` commands.

use std::fmt;

/// A point on the map. Tile38 takes `lat lon` in that order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Rectangle given by its south-west and north-east corners.
///
/// No ordering is enforced: an inverted or zero-area rectangle is rendered
/// as-is and the backend decides whether it is valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub sw: Point,
    pub ne: Point,
}

impl Bounds {
    pub fn new(sw: Point, ne: Point) -> Self {
        Self { sw, ne }
    }

    /// Degenerate rectangle covering a single point.
    pub fn point(p: Point) -> Self {
        Self { sw: p, ne: p }
    }
}

/// The area part of a search or fence.
#[derive(Debug, Clone, PartialEq)]
pub enum Area {
    /// `BOUNDS minlat minlon maxlat maxlon`
    Bounds(Bounds),
    /// `OBJECT <geojson>`
    Object(String),
    /// `GET <collection> <id>`: the geometry of another stored object.
    Get { collection: String, id: String },
    /// `POINT lat lon meters` (NEARBY only)
    Point { point: Point, meters: f64 },
    /// `ROAM <collection> <pattern> <meters>` (NEARBY fences only)
    Roam {
        collection: String,
        pattern: String,
        meters: f64,
    },
}

impl Area {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Area::Bounds(b) => vec![
                "BOUNDS".into(),
                b.sw.lat.to_string(),
                b.sw.lon.to_string(),
                b.ne.lat.to_string(),
                b.ne.lon.to_string(),
            ],
            Area::Object(json) => vec!["OBJECT".into(), json.clone()],
            Area::Get { collection, id } => vec!["GET".into(), collection.clone(), id.clone()],
            Area::Point { point, meters } => vec![
                "POINT".into(),
                point.lat.to_string(),
                point.lon.to_string(),
                meters.to_string(),
            ],
            Area::Roam {
                collection,
                pattern,
                meters,
            } => vec![
                "ROAM".into(),
                collection.clone(),
                pattern.clone(),
                meters.to_string(),
            ],
        }
    }
}

/// Spatial search kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Within,
    Intersects,
    Nearby,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Within => "WITHIN",
            SearchKind::Intersects => "INTERSECTS",
            SearchKind::Nearby => "NEARBY",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fence transitions a channel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detect {
    Inside,
    Outside,
    Enter,
    Exit,
    Cross,
}

impl Detect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Detect::Inside => "inside",
            Detect::Outside => "outside",
            Detect::Enter => "enter",
            Detect::Exit => "exit",
            Detect::Cross => "cross",
        }
    }
}

/// A geofence bound to a pub/sub channel with `SETCHAN`.
#[derive(Debug, Clone, PartialEq)]
pub struct FenceSpec {
    pub kind: SearchKind,
    /// Collection whose objects are watched.
    pub collection: String,
    /// Empty means every transition the backend reports.
    pub detect: Vec<Detect>,
    pub area: Area,
}

impl FenceSpec {
    pub fn new(kind: SearchKind, collection: impl Into<String>, area: Area) -> Self {
        Self {
            kind,
            collection: collection.into(),
            detect: Vec::new(),
            area,
        }
    }

    pub fn detect(mut self, detect: &[Detect]) -> Self {
        self.detect = detect.to_vec();
        self
    }

    /// Arguments following `SETCHAN <name>`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.kind.as_str().to_string(),
            self.collection.clone(),
            "FENCE".to_string(),
        ];
        if !self.detect.is_empty() {
            let detect: Vec<&str> = self.detect.iter().map(Detect::as_str).collect();
            args.push("DETECT".to_string());
            args.push(detect.join(","));
        }
        args.extend(self.area.to_args());
        args
    }
}

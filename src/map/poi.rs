use crate::algorithm::GeoLocation;
use std::sync::Arc;
/**
 * @file poi.rs
 * 定义地图上的兴趣点 (线路与站台)
 * 线路由若干段连续折线组成, 站台是一个点或一个多边形。
 */

/// Sentinel distance for a POI without a single usable segment.
pub const MAX_DISTANCE: f64 = f64::MAX;

/// One vertex of a route polyline.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub route_id: String,
    pub consecutive_section: usize, // 所属的连续段
    pub sequence: usize,            // 段内顺序
    pub lat: f64,
    pub lon: f64,
}

impl Section {
    pub fn new(
        route_id: String,
        consecutive_section: usize,
        sequence: usize,
        lat: f64,
        lon: f64,
    ) -> Self {
        Section {
            route_id,
            consecutive_section,
            sequence,
            lat,
            lon,
        }
    }

    pub fn location(&self) -> GeoLocation {
        GeoLocation::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    id: String,
    from: String,
    to: String,
    line_ref: String,           // 线路号, 比如 "302"
    sections: Vec<Vec<Section>>, // 连续段, 每段是一条独立折线
}

impl Route {
    pub fn new(
        id: String,
        from: String,
        to: String,
        line_ref: String,
        sections: Vec<Vec<Section>>,
    ) -> Self {
        Route {
            id,
            from,
            to,
            line_ref,
            sections,
        }
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_from(&self) -> &str {
        &self.from
    }

    pub fn get_to(&self) -> &str {
        &self.to
    }

    pub fn get_ref(&self) -> &str {
        &self.line_ref
    }

    pub fn get_sections(&self) -> &[Vec<Section>] {
        &self.sections
    }

    /// End point of the segment starting at `section` inside `consecutive_section`.
    /// A trailing or lone vertex is its own end.
    pub fn segment_end(&self, consecutive_section: usize, section: usize) -> Option<GeoLocation> {
        let points = self.sections.get(consecutive_section)?;
        points
            .get(section + 1)
            .or_else(|| points.get(section))
            .map(Section::location)
    }
}

#[derive(Debug, Clone)]
pub struct Stop {
    id: String,
    name: String,
    boundaries: Vec<GeoLocation>,
}

impl Stop {
    pub fn new(id: String, name: String, boundaries: Vec<GeoLocation>) -> Self {
        Stop {
            id,
            name,
            boundaries,
        }
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_boundaries(&self) -> &[GeoLocation] {
        &self.boundaries
    }
}

/// A route or a stop. Clones share the underlying data.
#[derive(Debug, Clone)]
pub enum Poi {
    Route(Arc<Route>),
    Stop(Arc<Stop>),
}

impl Poi {
    pub fn get_id(&self) -> &str {
        match self {
            Poi::Route(route) => route.get_id(),
            Poi::Stop(stop) => stop.get_id(),
        }
    }

    pub fn is_route(&self) -> bool {
        matches!(self, Poi::Route(_))
    }

    /// Routes and stops come from different id spaces, so identity is the
    /// kind together with the id.
    pub fn key(&self) -> (bool, &str) {
        (self.is_route(), self.get_id())
    }

    pub fn same_as(&self, other: &Poi) -> bool {
        self.key() == other.key()
    }

    pub fn as_route(&self) -> Option<&Arc<Route>> {
        match self {
            Poi::Route(route) => Some(route),
            Poi::Stop(_) => None,
        }
    }

    pub fn as_stop(&self) -> Option<&Arc<Stop>> {
        match self {
            Poi::Stop(stop) => Some(stop),
            Poi::Route(_) => None,
        }
    }

    /// Polylines used by the spatial index: every consecutive section of a
    /// route, or the boundary of a stop.
    pub fn polylines(&self) -> Vec<Vec<GeoLocation>> {
        match self {
            Poi::Route(route) => route
                .get_sections()
                .iter()
                .map(|points| points.iter().map(Section::location).collect())
                .collect(),
            Poi::Stop(stop) => vec![stop.get_boundaries().to_vec()],
        }
    }
}

impl From<Route> for Poi {
    fn from(route: Route) -> Self {
        Poi::Route(Arc::new(route))
    }
}

impl From<Stop> for Poi {
    fn from(stop: Stop) -> Self {
        Poi::Stop(Arc::new(stop))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Distance {
    /// Nearest segment of a route: starts at `section` inside `consecutive_section`.
    Section {
        poi_id: String,
        consecutive_section: usize,
        section: usize,
        value: f64,
    },
    /// Zero exactly when the location lies inside the stop polygon.
    Stop { poi_id: String, value: f64 },
}

impl Distance {
    pub fn value(&self) -> f64 {
        match self {
            Distance::Section { value, .. } => *value,
            Distance::Stop { value, .. } => *value,
        }
    }

    pub fn poi_id(&self) -> &str {
        match self {
            Distance::Section { poi_id, .. } => poi_id,
            Distance::Stop { poi_id, .. } => poi_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WithDistance<T = Poi> {
    pub poi: T,
    pub distance: Distance,
}

impl WithDistance<Poi> {
    pub fn get_id(&self) -> &str {
        self.poi.get_id()
    }

    /// Narrow a stop entry to the stop itself.
    pub fn to_stop(&self) -> Option<WithDistance<Arc<Stop>>> {
        self.poi.as_stop().map(|stop| WithDistance {
            poi: stop.clone(),
            distance: self.distance.clone(),
        })
    }
}

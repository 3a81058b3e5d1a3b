use geo::algorithm::bearing::Bearing;
use geo::algorithm::haversine_destination::HaversineDestination;
use geo::algorithm::haversine_distance::HaversineDistance;
use geo::{Contains, LineString, Point, Polygon};

/// 单次迭代求垂足时默认的收敛精度 (米)
pub const DEFAULT_PRECISION: f64 = 0.1;

// ternary search never needs more than this for segments shorter than the earth
const MAX_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoLocation {
            latitude,
            longitude,
        }
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    fn lerp(&self, other: &GeoLocation, t: f64) -> GeoLocation {
        GeoLocation {
            latitude: self.latitude + (other.latitude - self.latitude) * t,
            longitude: self.longitude + (other.longitude - self.longitude) * t,
        }
    }
}

impl From<Point<f64>> for GeoLocation {
    fn from(p: Point<f64>) -> Self {
        GeoLocation::new(p.y(), p.x())
    }
}

/// 计算两点之间的半正弦距离 (米)
pub fn distance_between(a: &GeoLocation, b: &GeoLocation) -> f64 {
    a.to_point().haversine_distance(&b.to_point())
}

/// Initial great-circle bearing from `a` to `b`, in degrees within [0, 360).
pub fn bearing(a: &GeoLocation, b: &GeoLocation) -> f64 {
    // geo 给出的是 (-180, 180]
    let degrees = a.to_point().bearing(b.to_point());
    let normalized = (degrees + 360.0) % 360.0;
    // 浮点误差可能得到 360.0
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Point reached after travelling `distance` meters from `origin` along `bearing_degrees`.
pub fn destination_point(origin: &GeoLocation, distance: f64, bearing_degrees: f64) -> GeoLocation {
    origin
        .to_point()
        .haversine_destination(bearing_degrees, distance)
        .into()
}

/// Distance in meters from `point` to the segment `start`..`end`.
///
/// The foot of the perpendicular is located by ternary search along the
/// segment until the remaining interval is shorter than `precision` meters,
/// so the result saturates at the end points when the foot falls outside.
/// A zero-length segment degrades to the distance to its single point.
pub fn distance_from_point_to_segment(
    point: &GeoLocation,
    start: &GeoLocation,
    end: &GeoLocation,
    precision: f64,
) -> f64 {
    let length = distance_between(start, end);
    if length == 0.0 {
        return distance_between(point, start);
    }
    let precision = if precision > 0.0 {
        precision
    } else {
        DEFAULT_PRECISION
    };
    let at = |t: f64| distance_between(point, &start.lerp(end, t));

    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut iterations = 0;
    while (hi - lo) * length > precision && iterations < MAX_ITERATIONS {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        if at(m1) < at(m2) {
            hi = m2;
        } else {
            lo = m1;
        }
        iterations += 1;
    }
    at((lo + hi) / 2.0).min(at(0.0)).min(at(1.0))
}

/// Ray casting test; the polygon is implicitly closed. Fewer than three
/// vertices never contain anything.
pub fn is_point_in_polygon(point: &GeoLocation, vertices: &[GeoLocation]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let exterior: LineString<f64> = vertices
        .iter()
        .map(|v| (v.longitude, v.latitude))
        .collect::<Vec<_>>()
        .into();
    Polygon::new(exterior, vec![]).contains(&point.to_point())
}

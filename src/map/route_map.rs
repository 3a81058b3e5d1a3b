use super::poi::Poi;
use crate::algorithm::GeoLocation;
use log::{debug, info};
use std::collections::{HashMap, HashSet};

/// Fractional digits kept when quantizing a coordinate: 0.01 degree cells,
/// about 1.1 km north-south and 0.7 km east-west at 51°N. A segment is only
/// bucketed under its first point, so lookups may miss segments whose start
/// lies more than one cell away from the queried location.
pub const FRACTION_DIGITS: i32 = 2;
// 经度格子的取值范围是 [-18000, 18000], 乘数必须大于它的两倍
const TILING_FACTOR: i64 = 100_000;

// 3x3 邻域, 包括 (1, 1)
const NEIGHBOURS: [(i64, i64); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Grid of 0.01 degree cells. Every bucket holds one POI clone per segment
/// starting inside the cell.
#[derive(Default)]
pub struct RouteMap {
    buckets: HashMap<i64, Vec<Poi>>,
    poi_count: usize,
}

impl RouteMap {
    pub fn new() -> Self {
        RouteMap::default()
    }

    pub fn cell(coordinate: f64) -> i64 {
        (coordinate * 10f64.powi(FRACTION_DIGITS)).round() as i64
    }

    fn key_of_cells(lat_cell: i64, lon_cell: i64) -> i64 {
        lat_cell * TILING_FACTOR + lon_cell
    }

    pub fn key(location: &GeoLocation) -> i64 {
        RouteMap::key_of_cells(
            RouteMap::cell(location.latitude),
            RouteMap::cell(location.longitude),
        )
    }

    pub fn poi_count(&self) -> usize {
        self.poi_count
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop everything and index `pois` from scratch.
    pub fn update(&mut self, pois: &[Poi]) {
        info!("start rebuild route map with {} pois...", pois.len());
        self.buckets.clear();
        self.poi_count = pois.len();
        let mut segment_count = 0;
        for poi in pois {
            for points in poi.polylines().iter() {
                // 单点折线当作一个退化线段
                let starts = if points.len() == 1 {
                    1
                } else {
                    points.len().saturating_sub(1)
                };
                for start in &points[..starts] {
                    self.insert(start, poi);
                    segment_count += 1;
                }
            }
        }
        debug!(
            "route map buckets: {}, segments: {}",
            self.buckets.len(),
            segment_count
        );
        info!("finish rebuild route map...");
    }

    fn insert(&mut self, at: &GeoLocation, poi: &Poi) {
        self.buckets
            .entry(RouteMap::key(at))
            .or_default()
            .push(poi.clone());
    }

    /// POIs with at least one segment starting in the 3x3 cells around
    /// `location`, each reported once in lookup order. A route and a stop
    /// sharing an id are distinct POIs.
    pub fn get_pois_at_location(&self, location: &GeoLocation) -> Vec<Poi> {
        let lat_cell = RouteMap::cell(location.latitude);
        let lon_cell = RouteMap::cell(location.longitude);
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for (d_lat, d_lon) in NEIGHBOURS.iter() {
            let key = RouteMap::key_of_cells(lat_cell + d_lat, lon_cell + d_lon);
            if let Some(pois) = self.buckets.get(&key) {
                for poi in pois {
                    if seen.insert(poi.key()) {
                        result.push(poi.clone());
                    }
                }
            }
        }
        result
    }
}

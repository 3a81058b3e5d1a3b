use super::model::GeoPosition;
use crate::algorithm::{self, GeoLocation};
use crate::map::{Distance, Poi, Route, RouteMap, Stop, WithDistance, MAX_DISTANCE};
use log::trace;

/// Exact distances from a position to the POIs the route map reports near it.
pub struct DistanceCalculator<'a> {
    route_map: &'a RouteMap,
    precision: f64,
}

impl<'a> DistanceCalculator<'a> {
    pub fn new(route_map: &'a RouteMap, precision: f64) -> Self {
        DistanceCalculator {
            route_map,
            precision,
        }
    }

    /// Nearby POIs sorted by ascending distance. With `filter_by_accuracy`
    /// and a known (positive) accuracy, POIs farther than twice the accuracy
    /// are dropped.
    pub fn get_unique_pois_near(
        &self,
        position: &GeoPosition,
        filter_by_accuracy: bool,
    ) -> Vec<WithDistance> {
        let location = position.location();
        let candidates = self.route_map.get_pois_at_location(&location);
        trace!("{} candidate pois from route map", candidates.len());
        let mut result: Vec<WithDistance> = candidates
            .into_iter()
            .map(|poi| {
                let distance = self.distance_to(&poi, &location);
                WithDistance { poi, distance }
            })
            .filter(|wd| {
                !filter_by_accuracy || wd.distance.value() <= position.accuracy_limit(2.0)
            })
            .collect();
        result.sort_by(|a, b| a.distance.value().total_cmp(&b.distance.value()));
        result
    }

    pub fn distance_to(&self, poi: &Poi, location: &GeoLocation) -> Distance {
        match poi {
            Poi::Route(route) => self.route_distance(route, location),
            Poi::Stop(stop) => self.stop_distance(stop, location),
        }
    }

    fn route_distance(&self, route: &Route, location: &GeoLocation) -> Distance {
        let mut best = (0, 0, MAX_DISTANCE);
        for (consecutive_section, points) in route.get_sections().iter().enumerate() {
            if points.len() == 1 {
                let d = algorithm::distance_between(location, &points[0].location());
                if d < best.2 {
                    best = (consecutive_section, 0, d);
                }
                continue;
            }
            for (section, pair) in points.windows(2).enumerate() {
                let d = algorithm::distance_from_point_to_segment(
                    location,
                    &pair[0].location(),
                    &pair[1].location(),
                    self.precision,
                );
                if d < best.2 {
                    best = (consecutive_section, section, d);
                }
            }
        }
        Distance::Section {
            poi_id: route.get_id().to_string(),
            consecutive_section: best.0,
            section: best.1,
            value: best.2,
        }
    }

    fn stop_distance(&self, stop: &Stop, location: &GeoLocation) -> Distance {
        let boundaries = stop.get_boundaries();
        let value = if algorithm::is_point_in_polygon(location, boundaries) {
            0.0
        } else {
            // 只计算相邻点组成的边, 不闭合多边形
            boundaries
                .windows(2)
                .map(|pair| {
                    algorithm::distance_from_point_to_segment(
                        location,
                        &pair[0],
                        &pair[1],
                        self.precision,
                    )
                })
                .fold(MAX_DISTANCE, f64::min)
        };
        Distance::Stop {
            poi_id: stop.get_id().to_string(),
            value,
        }
    }
}

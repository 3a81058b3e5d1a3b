use crate::algorithm::GeoLocation;
use crate::map::{Poi, Stop, WithDistance};
use std::sync::Arc;

/**
 * 定义检测需要的一些结构体
 * */

/// One GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64, // 米
    pub speed: f64,    // 米/秒
    pub altitude: Option<f64>,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, speed: f64) -> Self {
        GeoPosition {
            latitude,
            longitude,
            accuracy: accuracy.max(0.0),
            speed: speed.max(0.0),
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn location(&self) -> GeoLocation {
        GeoLocation::new(self.latitude, self.longitude)
    }

    /// Zero accuracy means the fix carries none; accuracy gates are skipped.
    pub fn accuracy_known(&self) -> bool {
        self.accuracy > 0.0
    }

    /// `accuracy * factor`, or unbounded when the accuracy is unknown.
    pub fn accuracy_limit(&self, factor: f64) -> f64 {
        if self.accuracy_known() {
            self.accuracy * factor
        } else {
            f64::INFINITY
        }
    }
}

/// Raw nearby POIs seen at one position, sorted by distance.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub position: GeoPosition,
    pub nearby: Vec<WithDistance>,
}

impl Snapshot {
    pub fn find(&self, poi: &Poi) -> Option<&WithDistance> {
        self.nearby.iter().find(|wd| wd.poi.same_as(poi))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Status {
    pub guesses: Vec<WithDistance>,
    pub nearby_platforms: Vec<WithDistance<Arc<Stop>>>,
}

impl Status {
    pub fn guess_ids(&self) -> Vec<&str> {
        self.guesses.iter().map(|g| g.get_id()).collect()
    }

    pub fn guessed_stops(&self) -> impl Iterator<Item = &WithDistance<Poi>> {
        self.guesses.iter().filter(|g| !g.poi.is_route())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub on_route_speed: f64,             // 超过这个速度优先认为在线路上 (米/秒)
    pub averaging_window: usize,         // 平均距离的采样数, 包括当前
    pub history_capacity: usize,         // 历史缓冲长度
    pub segment_precision: f64,          // 点到线段距离的精度 (米)
    pub max_route_distance: Option<f64>, // 高速时线路候选的最大距离, 默认不限制
}

impl Default for Config {
    fn default() -> Self {
        Config {
            on_route_speed: 3.0,
            averaging_window: 3,
            history_capacity: 10,
            segment_precision: 0.1,
            max_route_distance: None,
        }
    }
}

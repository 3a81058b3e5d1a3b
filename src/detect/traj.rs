use super::model::GeoPosition;
use crate::algorithm::{self, GeoLocation};
use anyhow::{anyhow, Context, Result};
use log::info;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// One recorded fix before speed synthesis.
#[derive(Debug, Clone)]
pub struct TrajInfo {
    pub location: GeoLocation,
    pub time_stamp: f64, // 秒
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
}

impl TrajInfo {
    fn at(time_stamp: f64, coordinates: &[f64]) -> Option<TrajInfo> {
        if coordinates.len() < 2 {
            return None;
        }
        Some(TrajInfo {
            location: GeoLocation::new(coordinates[1], coordinates[0]),
            time_stamp,
            accuracy: None,
            speed: None,
            altitude: coordinates.get(2).copied(),
        })
    }
}

pub type Trajectory = Vec<TrajInfo>;

fn from_coordinate_list(points: &[Vec<f64>]) -> Trajectory {
    points
        .iter()
        .enumerate()
        .filter_map(|(i, point)| TrajInfo::at(i as f64, point))
        .collect()
}

// 实现轨迹转换trait
impl TryFrom<geojson::Geometry> for TrajectoryInput {
    type Error = anyhow::Error;
    fn try_from(geometry: geojson::Geometry) -> Result<Self, Self::Error> {
        match geometry.value {
            geojson::Value::LineString(line) => Ok(TrajectoryInput(from_coordinate_list(&line))),
            geojson::Value::MultiPoint(points) => {
                Ok(TrajectoryInput(from_coordinate_list(&points)))
            }
            _ => Err(anyhow!("geometry only support LineString, MultiPoint")),
        }
    }
}

/// A trajectory parsed from GeoJSON or WKT.
pub struct TrajectoryInput(pub Trajectory);

impl TryFrom<geojson::GeoJson> for TrajectoryInput {
    type Error = anyhow::Error;
    fn try_from(value: geojson::GeoJson) -> Result<Self, Self::Error> {
        match value {
            geojson::GeoJson::Geometry(geometry) => geometry.try_into(),
            geojson::GeoJson::Feature(feature) => feature
                .geometry
                .ok_or_else(|| anyhow!("feature without geometry"))?
                .try_into(),
            geojson::GeoJson::FeatureCollection(fc) => {
                // 每个 Point feature 是一次定位, 属性里可以带精度和速度
                let mut traj = Trajectory::new();
                for (i, feature) in fc.features.into_iter().enumerate() {
                    let coordinates = match feature.geometry.map(|g| g.value) {
                        Some(geojson::Value::Point(point)) => point,
                        _ => return Err(anyhow!("feature {} is not a Point", i)),
                    };
                    let property = |name: &str| {
                        feature
                            .properties
                            .as_ref()
                            .and_then(|p| p.get(name))
                            .and_then(|v| v.as_f64())
                    };
                    let time_stamp = property("timestamp").unwrap_or(i as f64);
                    let mut info = TrajInfo::at(time_stamp, &coordinates)
                        .ok_or_else(|| anyhow!("feature {} has too few coordinates", i))?;
                    info.accuracy = property("accuracy");
                    info.speed = property("speed");
                    if let Some(altitude) = property("altitude") {
                        info.altitude = Some(altitude);
                    }
                    traj.push(info);
                }
                Ok(TrajectoryInput(traj))
            }
        }
    }
}

impl TryFrom<wkt::Wkt<f64>> for TrajectoryInput {
    type Error = anyhow::Error;
    fn try_from(value: wkt::Wkt<f64>) -> Result<Self, Self::Error> {
        let coords: Vec<wkt::types::Coord<f64>> = match value.item {
            wkt::Geometry::LineString(line) => line.0,
            wkt::Geometry::MultiPoint(multi_points) => {
                multi_points.0.into_iter().filter_map(|p| p.0).collect()
            }
            _ => return Err(anyhow!("wkt only support LineString, MultiPoint")),
        };
        Ok(TrajectoryInput(
            coords
                .into_iter()
                .enumerate()
                .map(|(i, c)| TrajInfo {
                    location: GeoLocation::new(c.y, c.x),
                    time_stamp: i as f64,
                    accuracy: None,
                    speed: None,
                    altitude: c.z,
                })
                .collect(),
        ))
    }
}

/// Turn fixes into positions. Missing speed is the great-circle distance to
/// the previous fix over the elapsed time, zero for the first fix.
pub fn to_positions(traj: &[TrajInfo], default_accuracy: f64) -> Vec<GeoPosition> {
    let mut positions = Vec::with_capacity(traj.len());
    let mut previous: Option<&TrajInfo> = None;
    for info in traj {
        let speed = info.speed.unwrap_or_else(|| match previous {
            Some(prev) if info.time_stamp > prev.time_stamp => {
                algorithm::distance_between(&prev.location, &info.location)
                    / (info.time_stamp - prev.time_stamp)
            }
            _ => 0.0,
        });
        let mut position = GeoPosition::new(
            info.location.latitude,
            info.location.longitude,
            info.accuracy.unwrap_or(default_accuracy),
            speed,
        );
        if let Some(altitude) = info.altitude {
            position = position.with_altitude(altitude);
        }
        positions.push(position);
        previous = Some(info);
    }
    positions
}

/// Read a `.geojson` or `.wkt` trajectory file.
pub fn read_positions<P: AsRef<Path>>(path: P, default_accuracy: f64) -> Result<Vec<GeoPosition>> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let input: TrajectoryInput = match ext {
        "geojson" | "json" => {
            info!("read geojson file {} ", path.display());
            let file =
                File::open(path).with_context(|| format!("open {} failed", path.display()))?;
            let geojson = geojson::GeoJson::from_reader(BufReader::new(file))?;
            geojson.try_into()?
        }
        "wkt" => {
            info!("read wkt file {} ", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("read {} failed", path.display()))?;
            let wkt: wkt::Wkt<f64> = content
                .trim()
                .parse()
                .map_err(|e| anyhow!("read gps traj failed: {}", e))?;
            wkt.try_into()?
        }
        _ => return Err(anyhow!("gps file format {} not support", ext)),
    };
    Ok(to_positions(&input.0, default_accuracy))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_geojson_points_with_properties() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [7.094044, 51.514508, 60.0]},
                 "properties": {"accuracy": 4.8, "timestamp": 10}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [7.094244, 51.514508]},
                 "properties": {"accuracy": 4.8, "timestamp": 12}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [7.094444, 51.514508]},
                 "properties": {"speed": 1.5, "timestamp": 14}}
            ]
        }"#;
        let geojson: geojson::GeoJson = text.parse().unwrap();
        let TrajectoryInput(traj) = geojson.try_into().unwrap();
        assert_eq!(traj.len(), 3);
        let positions = to_positions(&traj, 10.0);
        assert_eq!(positions[0].speed, 0.0);
        assert_eq!(positions[0].altitude, Some(60.0));
        assert_eq!(positions[0].accuracy, 4.8);
        let step = algorithm::distance_between(&traj[0].location, &traj[1].location);
        assert!((positions[1].speed - step / 2.0).abs() < 1e-9);
        assert_eq!(positions[2].speed, 1.5);
        assert_eq!(positions[2].accuracy, 10.0);
    }

    #[test]
    fn test_geojson_linestring() {
        let text = r#"{"type": "LineString", "coordinates": [[7.0, 51.0], [7.0, 51.001]]}"#;
        let geojson: geojson::GeoJson = text.parse().unwrap();
        let TrajectoryInput(traj) = geojson.try_into().unwrap();
        let positions = to_positions(&traj, 5.0);
        assert_eq!(positions.len(), 2);
        assert!((positions[1].speed - 111.0).abs() < 1.0);
    }

    #[test]
    fn test_wkt_linestring() {
        let wkt: wkt::Wkt<f64> = "LINESTRING(7.0 51.0,7.0 51.0005,7.0 51.001)".parse().unwrap();
        let TrajectoryInput(traj) = wkt.try_into().unwrap();
        assert_eq!(traj.len(), 3);
        assert_eq!(traj[2].location, GeoLocation::new(51.001, 7.0));
        assert_eq!(traj[2].time_stamp, 2.0);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(read_positions("track.gpx", 5.0).is_err());
    }
}

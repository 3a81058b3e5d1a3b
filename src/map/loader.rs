use super::poi::{Poi, Route, Section, Stop};
use crate::algorithm::GeoLocation;
use anyhow::{Context, Result};
use flate2::read::DeflateDecoder;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const ROUTES_FILE: &str = "routes.csv.zlib";
pub const SECTIONS_FILE: &str = "sections.csv.zlib";
pub const PLATFORMS_FILE: &str = "platforms.csv.zlib";
pub const PLATFORM_BOUNDS_FILE: &str = "platformBounds.csv.zlib";

/// Load routes and stops from the four compressed csv files in `dir`.
pub fn load_pois_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Poi>> {
    let dir = dir.as_ref();
    debug!("loading pois from : {}", dir.display());
    let open = |name: &str| -> Result<BufReader<File>> {
        let path = dir.join(name);
        let file =
            File::open(&path).with_context(|| format!("open {} failed", path.display()))?;
        Ok(BufReader::new(file))
    };
    let pois = load_pois(
        open(ROUTES_FILE)?,
        open(SECTIONS_FILE)?,
        open(PLATFORMS_FILE)?,
        open(PLATFORM_BOUNDS_FILE)?,
    )?;
    info!("load pois success dir: {} ", dir.display());
    Ok(pois)
}

/// Same as [`load_pois_from_dir`] over arbitrary raw deflate streams.
pub fn load_pois<R1: Read, R2: Read, R3: Read, R4: Read>(
    routes: R1,
    sections: R2,
    platforms: R3,
    bounds: R4,
) -> Result<Vec<Poi>> {
    let routes = inflate(routes).context("inflate routes failed")?;
    let sections = inflate(sections).context("inflate sections failed")?;
    let platforms = inflate(platforms).context("inflate platforms failed")?;
    let bounds = inflate(bounds).context("inflate platform bounds failed")?;

    let mut pois = parse_routes(&routes, &sections)?;
    let route_count = pois.len();
    pois.extend(parse_stops(&platforms, &bounds)?);
    debug!(
        "route size: {}, stop size: {}",
        route_count,
        pois.len() - route_count
    );
    Ok(pois)
}

fn inflate<R: Read>(reader: R) -> Result<String> {
    let mut text = String::new();
    DeflateDecoder::new(reader).read_to_string(&mut text)?;
    Ok(text)
}

fn records(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn field<T: std::str::FromStr>(record: &csv::StringRecord, index: usize) -> Option<T> {
    record.get(index).and_then(|v| v.trim().parse().ok())
}

fn parse_routes(routes: &str, sections: &str) -> Result<Vec<Poi>> {
    // route id -> 连续段 -> (sequence, 点)
    let mut points: HashMap<String, HashMap<usize, Vec<Section>>> = HashMap::new();
    for result in records(sections).records() {
        let record = result?;
        let route_id: Option<String> = field(&record, 0);
        let consecutive: Option<usize> = field(&record, 1);
        let sequence: Option<usize> = field(&record, 2);
        let lat: Option<f64> = field(&record, 3);
        let lon: Option<f64> = field(&record, 4);
        match (route_id, consecutive, sequence, lat, lon) {
            (Some(route_id), Some(consecutive), Some(sequence), Some(lat), Some(lon)) => {
                points
                    .entry(route_id.clone())
                    .or_default()
                    .entry(consecutive)
                    .or_default()
                    .push(Section::new(route_id, consecutive, sequence, lat, lon));
            }
            _ => warn!("skip malformed section row {:?}", record),
        }
    }

    let mut result = Vec::new();
    for row in records(routes).records() {
        let record = row?;
        let id = match record.get(0) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("skip route row without id {:?}", record);
                continue;
            }
        };
        let text = |index: usize| record.get(index).unwrap_or("").to_string();
        let mut consecutive_sections: Vec<(usize, Vec<Section>)> = points
            .remove(&id)
            .map(|by_section| by_section.into_iter().collect())
            .unwrap_or_default();
        consecutive_sections.sort_by_key(|(index, _)| *index);
        let sections = consecutive_sections
            .into_iter()
            .map(|(_, mut run)| {
                run.sort_by_key(|s| s.sequence);
                run
            })
            .collect();
        result.push(Route::new(id, text(1), text(2), text(3), sections).into());
    }
    for route_id in points.keys() {
        warn!("sections reference unknown route {}", route_id);
    }
    Ok(result)
}

fn parse_stops(platforms: &str, bounds: &str) -> Result<Vec<Poi>> {
    let mut boundaries: HashMap<String, Vec<GeoLocation>> = HashMap::new();
    for result in records(bounds).records() {
        let record = result?;
        let id: Option<String> = field(&record, 0);
        let lat: Option<f64> = field(&record, 1);
        let lon: Option<f64> = field(&record, 2);
        match (id, lat, lon) {
            (Some(id), Some(lat), Some(lon)) => boundaries
                .entry(id)
                .or_default()
                .push(GeoLocation::new(lat, lon)),
            _ => warn!("skip malformed platform bound row {:?}", record),
        }
    }

    let mut result = Vec::new();
    for row in records(platforms).records() {
        let record = row?;
        let id = match record.get(0) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("skip platform row without id {:?}", record);
                continue;
            }
        };
        let name = record.get(1).unwrap_or("").to_string();
        let points = boundaries.remove(&id).unwrap_or_default();
        result.push(Stop::new(id, name, points).into());
    }
    for stop_id in boundaries.keys() {
        warn!("bounds reference unknown platform {}", stop_id);
    }
    Ok(result)
}

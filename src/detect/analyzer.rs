use super::distance::DistanceCalculator;
use super::model::{Config, GeoPosition, Status};
use super::state::{History, State};
use crate::map::{Poi, RouteMap};
use anyhow::Result;
use log::{debug, info};

/// Owns the route map, the current state and the history buffers. All
/// mutation goes through `&mut self`; wrap it in a `Mutex` to share it.
pub struct Analyzer {
    config: Config,
    route_map: RouteMap,
    state: State,
    history: History,
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        let history = History::new(config.history_capacity);
        Analyzer {
            config,
            route_map: RouteMap::new(),
            state: State::Initial,
            history,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the POI set. Guesses and history survive until the next
    /// position update re-evaluates them.
    pub fn update_pois(&mut self, pois: &[Poi]) {
        self.route_map.update(pois);
        info!(
            "analyzer now tracks {} pois in {} buckets",
            self.route_map.poi_count(),
            self.route_map.bucket_count()
        );
    }

    pub fn update_position(&mut self, position: GeoPosition) -> Result<()> {
        let calculator = DistanceCalculator::new(&self.route_map, self.config.segment_precision);
        let next = self
            .state
            .next(position, &calculator, &mut self.history, &self.config)?;
        debug!("analyzer state: {}", next.name());
        self.state = next;
        Ok(())
    }

    pub fn get_status(&self) -> Status {
        self.state.status()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(Config::default())
    }
}

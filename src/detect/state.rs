use super::distance::DistanceCalculator;
use super::history::BoundedHistory;
use super::model::{Config, GeoPosition, Snapshot, Status};
use crate::algorithm;
use crate::map::{Distance, Stop, WithDistance, MAX_DISTANCE};
use anyhow::{bail, Result};
use log::{debug, trace};
use std::collections::HashSet;
use std::sync::Arc;

/// Rolling buffers shared by every state of one analyzer.
#[derive(Debug, Clone)]
pub struct History {
    pub snapshots: BoundedHistory<Snapshot>, // 每个位置的原始附近 POI
    pub states: BoundedHistory<State>,       // 每次转移的结果
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            snapshots: BoundedHistory::new(capacity),
            states: BoundedHistory::new(capacity),
        }
    }
}

/// What every non-initial state knows about the position it was built from.
#[derive(Debug, Clone)]
pub struct Filled {
    pub position: GeoPosition,
    pub nearby_platforms: Vec<WithDistance<Arc<Stop>>>,
}

#[derive(Debug, Clone)]
pub struct RouteState {
    filled: Filled,
    guesses: Vec<WithDistance>,
    possibility_ids: HashSet<String>,
}

impl RouteState {
    pub fn new(
        filled: Filled,
        guesses: Vec<WithDistance>,
        possibility_ids: HashSet<String>,
    ) -> Result<Self> {
        if guesses.is_empty() {
            bail!("route state without guesses");
        }
        if possibility_ids.is_empty() {
            bail!("route state without possibilities");
        }
        if let Some(g) = guesses.iter().find(|g| !g.poi.is_route()) {
            bail!("route state guess {} is not a route", g.get_id());
        }
        Ok(RouteState {
            filled,
            guesses,
            possibility_ids,
        })
    }

    pub fn possibility_ids(&self) -> &HashSet<String> {
        &self.possibility_ids
    }
}

#[derive(Debug, Clone)]
pub struct StopState {
    filled: Filled,
    guesses: Vec<WithDistance>,
}

impl StopState {
    pub fn new(filled: Filled, guesses: Vec<WithDistance>) -> Result<Self> {
        if guesses.is_empty() {
            bail!("stop state without guesses");
        }
        if let Some(g) = guesses.iter().find(|g| g.poi.is_route()) {
            bail!("stop state guess {} is not a stop", g.get_id());
        }
        Ok(StopState { filled, guesses })
    }
}

/// No guess, but the position and history still count for later updates.
#[derive(Debug, Clone)]
pub struct UnknownState {
    filled: Filled,
}

#[derive(Debug, Clone)]
pub enum State {
    Initial,
    Route(RouteState),
    Stop(StopState),
    Unknown(UnknownState),
}

impl Default for State {
    fn default() -> Self {
        State::Initial
    }
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Initial => "initial",
            State::Route(_) => "route",
            State::Stop(_) => "stop",
            State::Unknown(_) => "unknown",
        }
    }

    pub fn guesses(&self) -> &[WithDistance] {
        match self {
            State::Route(s) => &s.guesses,
            State::Stop(s) => &s.guesses,
            State::Initial | State::Unknown(_) => &[],
        }
    }

    fn filled(&self) -> Option<&Filled> {
        match self {
            State::Initial => None,
            State::Route(s) => Some(&s.filled),
            State::Stop(s) => Some(&s.filled),
            State::Unknown(s) => Some(&s.filled),
        }
    }

    pub fn position(&self) -> Option<&GeoPosition> {
        self.filled().map(|f| &f.position)
    }

    pub fn nearby_platforms(&self) -> &[WithDistance<Arc<Stop>>] {
        self.filled()
            .map(|f| f.nearby_platforms.as_slice())
            .unwrap_or(&[])
    }

    pub fn status(&self) -> Status {
        Status {
            guesses: self.guesses().to_vec(),
            nearby_platforms: self.nearby_platforms().to_vec(),
        }
    }

    /// Advance by one position. Records the raw snapshot and the resulting
    /// state in `history`.
    pub fn next(
        &self,
        position: GeoPosition,
        calculator: &DistanceCalculator,
        history: &mut History,
        config: &Config,
    ) -> Result<State> {
        let nearby = calculator.get_unique_pois_near(&position, false);
        debug!(
            "{} pois near ({}, {})",
            nearby.len(),
            position.latitude,
            position.longitude
        );
        history.snapshots.push(Snapshot { position, nearby });

        let next = {
            let snapshots = &history.snapshots;
            let window = config.averaging_window.max(1);
            let (current, previous) = match snapshots.last() {
                Some(current) => (current, snapshots.back(1)),
                None => bail!("snapshot history is empty right after push"),
            };

            let filled = Filled {
                position,
                nearby_platforms: current
                    .nearby
                    .iter()
                    .filter(|wd| wd.distance.value() <= position.accuracy_limit(2.0))
                    .filter_map(|wd| wd.to_stop())
                    .collect(),
            };

            let mut routes = Vec::new();
            let mut stops = Vec::new();
            for wd in current.nearby.iter() {
                if wd.distance.value() >= MAX_DISTANCE {
                    continue;
                }
                if !wd.poi.is_route() {
                    stops.push((wd.clone(), averaged_distance(snapshots, wd, window)));
                    continue;
                }
                if !is_moving_forward(wd, previous, &position) {
                    trace!("route {} rejected by direction", wd.get_id());
                    continue;
                }
                if let State::Route(state) = self {
                    // 只在已有的可能线路里重新排序
                    if !state.possibility_ids.contains(wd.get_id()) {
                        continue;
                    }
                }
                routes.push((wd.clone(), averaged_distance(snapshots, wd, window)));
            }

            // 精度未知 (0) 时不按精度过滤
            let fast = position.speed > config.on_route_speed;
            let route_limit = if fast {
                config.max_route_distance.unwrap_or(f64::INFINITY)
            } else {
                position.accuracy_limit(2.0)
            };
            let routes: Vec<_> = routes
                .into_iter()
                .filter(|(_, averaged)| *averaged < route_limit)
                .collect();
            let stop_limit = position.accuracy_limit(0.5);
            let stops: Vec<_> = stops
                .into_iter()
                .filter(|(_, averaged)| *averaged < stop_limit)
                .collect();

            if fast {
                match route_state(filled.clone(), routes)? {
                    Some(state) => state,
                    None => stop_state(filled.clone(), stops)?
                        .unwrap_or(State::Unknown(UnknownState { filled })),
                }
            } else {
                match stop_state(filled.clone(), stops)? {
                    Some(state) => state,
                    None => route_state(filled.clone(), routes)?
                        .unwrap_or(State::Unknown(UnknownState { filled })),
                }
            }
        };

        debug!(
            "state {} -> {} with guesses {:?}",
            self.name(),
            next.name(),
            next.guesses().iter().map(|g| g.get_id()).collect::<Vec<_>>()
        );
        history.states.push(next.clone());
        Ok(next)
    }
}

fn route_state(filled: Filled, routes: Vec<(WithDistance, f64)>) -> Result<Option<State>> {
    if routes.is_empty() {
        return Ok(None);
    }
    let possibility_ids = routes
        .iter()
        .map(|(wd, _)| wd.get_id().to_string())
        .collect();
    let guesses = closest_ties(routes);
    Ok(Some(State::Route(RouteState::new(
        filled,
        guesses,
        possibility_ids,
    )?)))
}

fn stop_state(filled: Filled, stops: Vec<(WithDistance, f64)>) -> Result<Option<State>> {
    if stops.is_empty() {
        return Ok(None);
    }
    let guesses = closest_ties(stops);
    Ok(Some(State::Stop(StopState::new(filled, guesses)?)))
}

/// Every candidate sharing the exact minimum averaged distance.
fn closest_ties(candidates: Vec<(WithDistance, f64)>) -> Vec<WithDistance> {
    let min = candidates
        .iter()
        .map(|(_, averaged)| *averaged)
        .fold(f64::INFINITY, f64::min);
    candidates
        .into_iter()
        .filter(|(_, averaged)| *averaged == min)
        .map(|(wd, _)| wd)
        .collect()
}

/// Mean of the current distance and the same POI's distance in the
/// `window - 1` preceding snapshots. A missing sample counts as the current
/// distance.
fn averaged_distance(snapshots: &BoundedHistory<Snapshot>, current: &WithDistance, window: usize) -> f64 {
    let value = current.distance.value();
    let mut sum = value;
    for offset in 1..window {
        sum += snapshots
            .back(offset)
            .and_then(|s| s.find(&current.poi))
            .map(|wd| wd.distance.value())
            .filter(|d| *d < MAX_DISTANCE)
            .unwrap_or(value);
    }
    sum / window as f64
}

/// Stops always pass. A route passes when it was not seen before, when the
/// nearest segment moved to a later one, or when within the same segment the
/// distance to its end grew by less than both fixes' accuracy combined.
fn is_moving_forward(
    current: &WithDistance,
    previous: Option<&Snapshot>,
    position: &GeoPosition,
) -> bool {
    let route = match current.poi.as_route() {
        Some(route) => route,
        None => return true,
    };
    let previous = match previous {
        Some(previous) => previous,
        None => return true,
    };
    let before = match previous.find(&current.poi) {
        Some(before) => before,
        None => return true,
    };
    match (&current.distance, &before.distance) {
        (
            Distance::Section {
                consecutive_section,
                section,
                ..
            },
            Distance::Section {
                consecutive_section: prev_consecutive_section,
                section: prev_section,
                ..
            },
        ) => {
            let now = (*consecutive_section, *section);
            let then = (*prev_consecutive_section, *prev_section);
            if now != then {
                return now > then;
            }
            let end = match route.segment_end(now.0, now.1) {
                Some(end) => end,
                None => return true,
            };
            let to_end_now = algorithm::distance_between(&position.location(), &end);
            let to_end_then = algorithm::distance_between(&previous.position.location(), &end);
            to_end_now - to_end_then - (position.accuracy + previous.position.accuracy) < 0.0
        }
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::algorithm::{destination_point, GeoLocation, DEFAULT_PRECISION};
    use crate::map::{Poi, Route, RouteMap, Section};

    fn route(id: &str, points: &[GeoLocation]) -> Poi {
        let sections = points
            .iter()
            .enumerate()
            .map(|(i, p)| Section::new(id.to_string(), 0, i, p.latitude, p.longitude))
            .collect();
        Route::new(id.into(), "a".into(), "b".into(), id.into(), vec![sections]).into()
    }

    fn square_stop(id: &str, center: &GeoLocation, half_side: f64) -> Poi {
        let n = destination_point(center, half_side, 0.0);
        let s = destination_point(center, half_side, 180.0);
        let e = destination_point(center, half_side, 90.0);
        let w = destination_point(center, half_side, 270.0);
        Stop::new(
            id.into(),
            id.into(),
            vec![
                GeoLocation::new(n.latitude, w.longitude),
                GeoLocation::new(n.latitude, e.longitude),
                GeoLocation::new(s.latitude, e.longitude),
                GeoLocation::new(s.latitude, w.longitude),
            ],
        )
        .into()
    }

    fn east_line(origin: &GeoLocation, north_offset: f64, length: f64) -> Vec<GeoLocation> {
        let start = destination_point(origin, north_offset, 0.0);
        vec![start, destination_point(&start, length, 90.0)]
    }

    fn at(origin: &GeoLocation, east: f64, accuracy: f64, speed: f64) -> GeoPosition {
        let p = destination_point(origin, east, 90.0);
        GeoPosition::new(p.latitude, p.longitude, accuracy, speed)
    }

    struct Machine {
        map: RouteMap,
        history: History,
        state: State,
        config: Config,
    }

    impl Machine {
        fn new(pois: &[Poi]) -> Self {
            Self::with_config(pois, Config::default())
        }

        fn with_config(pois: &[Poi], config: Config) -> Self {
            let mut map = RouteMap::new();
            map.update(pois);
            Machine {
                map,
                history: History::new(config.history_capacity),
                state: State::Initial,
                config,
            }
        }

        fn step(&mut self, position: GeoPosition) -> &State {
            let calculator = DistanceCalculator::new(&self.map, DEFAULT_PRECISION);
            self.state = self
                .state
                .next(position, &calculator, &mut self.history, &self.config)
                .unwrap();
            &self.state
        }

        fn ids(&self) -> Vec<String> {
            let mut ids: Vec<String> = self
                .state
                .guesses()
                .iter()
                .map(|g| g.get_id().to_string())
                .collect();
            ids.sort();
            ids
        }
    }

    #[test]
    fn test_constructors_reject_empty() {
        let filled = Filled {
            position: GeoPosition::new(51.5, 7.0, 5.0, 0.0),
            nearby_platforms: vec![],
        };
        let mut ids = HashSet::new();
        assert!(RouteState::new(filled.clone(), vec![], ids.clone()).is_err());
        ids.insert("r".to_string());
        assert!(RouteState::new(filled.clone(), vec![], ids).is_err());
        assert!(StopState::new(filled, vec![]).is_err());
    }

    #[test]
    fn test_initial_state_is_empty() {
        let state = State::default();
        assert_eq!(state.name(), "initial");
        assert!(state.guesses().is_empty());
        assert!(state.position().is_none());
        assert!(state.status().nearby_platforms.is_empty());
    }

    #[test]
    fn test_forward_progress_accepted() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 2.0, 500.0))]);
        machine.step(at(&origin, 100.0, 3.0, 8.0));
        let state = machine.step(at(&origin, 120.0, 3.0, 8.0));
        assert_eq!(state.name(), "route");
        assert_eq!(machine.ids(), vec!["r"]);
    }

    #[test]
    fn test_backward_progress_rejected() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 2.0, 500.0))]);
        machine.step(at(&origin, 150.0, 3.0, 8.0));
        assert_eq!(machine.ids(), vec!["r"]);
        let state = machine.step(at(&origin, 120.0, 3.0, 8.0));
        assert_eq!(state.name(), "unknown");
        assert!(state.guesses().is_empty());
        assert!(state.position().is_some());
    }

    #[test]
    fn test_jitter_within_accuracy_accepted() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 2.0, 500.0))]);
        machine.step(at(&origin, 150.0, 5.0, 8.0));
        machine.step(at(&origin, 146.0, 5.0, 8.0));
        assert_eq!(machine.ids(), vec!["r"]);
    }

    #[test]
    fn test_later_section_accepted() {
        let origin = GeoLocation::new(51.5, 7.0);
        let start = destination_point(&origin, 2.0, 0.0);
        let points = vec![
            start,
            destination_point(&start, 100.0, 90.0),
            destination_point(&start, 200.0, 90.0),
        ];
        let mut machine = Machine::new(&[route("r", &points)]);
        machine.step(at(&origin, 95.0, 0.0, 8.0));
        machine.step(at(&origin, 105.0, 0.0, 8.0));
        assert_eq!(machine.ids(), vec!["r"]);
    }

    #[test]
    fn test_ties_are_all_kept() {
        let origin = GeoLocation::new(51.5, 7.0);
        let line = east_line(&origin, 2.0, 500.0);
        let other = east_line(&origin, 6.0, 500.0);
        let mut machine = Machine::new(&[
            route("a", &line),
            route("b", &line),
            route("c", &other),
        ]);
        for east in [100.0, 115.0, 130.0] {
            machine.step(at(&origin, east, 3.0, 8.0));
            assert_eq!(machine.ids(), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_averaging_smooths_single_sample() {
        let origin = GeoLocation::new(51.5, 7.0);
        let near = east_line(&origin, 1.0, 500.0);
        let far = east_line(&origin, 10.0, 500.0);
        let mut machine = Machine::new(&[route("near", &near), route("far", &far)]);
        machine.step(at(&origin, 100.0, 3.0, 8.0));
        machine.step(at(&origin, 115.0, 3.0, 8.0));
        // 单次偏向 far, 平均后仍然是 near
        let p = destination_point(&destination_point(&origin, 130.0, 90.0), 6.5, 0.0);
        machine.step(GeoPosition::new(p.latitude, p.longitude, 3.0, 8.0));
        assert_eq!(machine.ids(), vec!["near"]);
    }

    fn with_ceiling(meters: f64) -> Config {
        Config {
            max_route_distance: Some(meters),
            ..Config::default()
        }
    }

    #[test]
    fn test_possibilities_never_grow() {
        let origin = GeoLocation::new(51.5, 7.0);
        let line = east_line(&origin, 2.0, 500.0);
        let late_start = destination_point(&line[0], 200.0, 90.0);
        let late = vec![late_start, line[1]];
        let mut machine =
            Machine::with_config(&[route("a", &line), route("late", &late)], with_ceiling(50.0));
        machine.step(at(&origin, 20.0, 3.0, 8.0));
        match &machine.state {
            State::Route(state) => {
                assert_eq!(state.possibility_ids().len(), 1);
                assert!(state.possibility_ids().contains("a"));
            }
            other => panic!("unexpected state {}", other.name()),
        }
        for east in [
            40.0, 60.0, 80.0, 100.0, 120.0, 140.0, 160.0, 180.0, 200.0, 220.0, 240.0,
        ] {
            machine.step(at(&origin, east, 3.0, 8.0));
            assert_eq!(machine.ids(), vec!["a"]);
        }
    }

    #[test]
    fn test_slow_inside_stop() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[
            square_stop("s", &origin, 15.0),
            route("r", &east_line(&origin, 30.0, 500.0)),
        ]);
        let state = machine.step(GeoPosition::new(origin.latitude, origin.longitude, 4.0, 0.5));
        assert_eq!(state.name(), "stop");
        assert_eq!(machine.ids(), vec!["s"]);
        assert_eq!(machine.state.nearby_platforms().len(), 1);
        assert_eq!(machine.state.nearby_platforms()[0].distance.value(), 0.0);
    }

    #[test]
    fn test_slow_near_route_falls_back_to_route() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 2.0, 500.0))]);
        machine.step(at(&origin, 100.0, 4.0, 1.0));
        assert_eq!(machine.ids(), vec!["r"]);
        // 远离线路且低速
        let p = destination_point(&destination_point(&origin, 100.0, 90.0), 40.0, 180.0);
        let state = machine.step(GeoPosition::new(p.latitude, p.longitude, 4.0, 1.0));
        assert_eq!(state.name(), "unknown");
    }

    #[test]
    fn test_far_route_not_guessed_when_fast() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::with_config(
            &[route("r", &east_line(&origin, 200.0, 500.0))],
            with_ceiling(50.0),
        );
        let state = machine.step(at(&origin, 100.0, 4.0, 10.0));
        assert_eq!(state.name(), "unknown");
    }

    #[test]
    fn test_far_route_kept_by_default() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 60.0, 500.0))]);
        let state = machine.step(at(&origin, 100.0, 40.0, 10.0));
        assert_eq!(state.name(), "route");
        assert_eq!(machine.ids(), vec!["r"]);
    }

    #[test]
    fn test_unknown_accuracy_skips_gates() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 2.0, 500.0))]);
        let state = machine.step(at(&origin, 100.0, 0.0, 1.0));
        assert_eq!(state.name(), "route");
        assert_eq!(machine.ids(), vec!["r"]);

        let mut machine = Machine::new(&[square_stop("s", &origin, 15.0)]);
        let state = machine.step(GeoPosition::new(origin.latitude, origin.longitude, 0.0, 0.5));
        assert_eq!(state.name(), "stop");
        assert_eq!(machine.ids(), vec!["s"]);
        assert_eq!(machine.state.nearby_platforms().len(), 1);
    }

    #[test]
    fn test_route_and_stop_sharing_an_id() {
        let origin = GeoLocation::new(51.5, 7.0);
        // 站台 "42" 覆盖整段轨迹, 不能影响线路 "42" 的平均距离
        let mut machine = Machine::new(&[
            route("42", &east_line(&origin, 3.0, 500.0)),
            route("7", &east_line(&origin, 2.0, 500.0)),
            square_stop("42", &origin, 400.0),
        ]);
        for east in [100.0, 115.0, 130.0] {
            let state = machine.step(at(&origin, east, 3.0, 8.0));
            assert_eq!(state.name(), "route");
            assert_eq!(machine.ids(), vec!["7"]);
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let origin = GeoLocation::new(51.5, 7.0);
        let mut machine = Machine::new(&[route("r", &east_line(&origin, 2.0, 500.0))]);
        for i in 0..15 {
            machine.step(at(&origin, 10.0 * i as f64, 3.0, 8.0));
        }
        assert_eq!(machine.history.snapshots.len(), 10);
        assert_eq!(machine.history.states.len(), 10);
        assert_eq!(machine.history.states.last().map(|s| s.name()), Some("route"));
    }
}

use rustc_hash::FxHashMap;

use gtfs_shapes_model::{RouteType, Stop, StopTime};

use super::StopToShapeMatcherSettings;
use crate::geo::LatLng;

/// Parent stations followed when a stop has no coordinates of its own.
const MAX_PARENT_LEVELS: usize = 3;

pub type StopsById<'a> = FxHashMap<&'a str, &'a Stop>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationSize {
    Small,
    Large,
}

impl StationSize {
    pub fn for_route_type(route_type: RouteType) -> Self {
        if route_type.is_rail_based() {
            StationSize::Large
        } else {
            StationSize::Small
        }
    }
}

/// One stop time of a trip, positioned on the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopVisit<'a> {
    pub location: LatLng,
    pub stop_id: &'a str,
    pub stop_sequence: u32,
    pub user_distance: Option<f64>,
    pub snap_tolerance_meters: f64,
    pub csv_row_number: u64,
}

/// The visits of one trip, ordered by `stop_sequence`.
#[derive(Debug, Clone)]
pub struct StopPoints<'a> {
    visits: Vec<StopVisit<'a>>,
}

impl<'a> StopPoints<'a> {
    /// Returns `None` when there is no visit to match.
    pub fn new(mut visits: Vec<StopVisit<'a>>) -> Option<Self> {
        if visits.is_empty() {
            return None;
        }
        visits.sort_by_key(|visit| visit.stop_sequence);
        Some(Self { visits })
    }

    /// Positions the stop times of one trip. Stop times are `(csv row number,
    /// row)` pairs; those whose stop and ancestors all lack coordinates are
    /// left out.
    pub fn from_stop_times(
        stop_times: &[(u64, &'a StopTime)],
        stops_by_id: &StopsById<'a>,
        station_size: StationSize,
        settings: &StopToShapeMatcherSettings,
    ) -> Option<Self> {
        let mut visits = Vec::with_capacity(stop_times.len());
        for &(csv_row_number, stop_time) in stop_times {
            let stop_id = stop_time.stop_id.trim();
            if stop_id.is_empty() {
                continue;
            }
            let Some(location) = stop_or_parent_location(stops_by_id, stop_id) else {
                continue;
            };
            visits.push(StopVisit {
                location,
                stop_id,
                stop_sequence: stop_time.stop_sequence,
                user_distance: stop_time.shape_dist_traveled,
                snap_tolerance_meters: settings.snap_tolerance(station_size, false),
                csv_row_number,
            });
        }
        visits.sort_by_key(|visit| visit.stop_sequence);

        let terminal_tolerance = settings.snap_tolerance(station_size, true);
        if let Some(first) = visits.first_mut() {
            first.snap_tolerance_meters = terminal_tolerance;
        }
        if let Some(last) = visits.last_mut() {
            last.snap_tolerance_meters = terminal_tolerance;
        }
        Self::new(visits)
    }

    pub fn visits(&self) -> &[StopVisit<'a>] {
        &self.visits
    }

    pub fn get(&self, index: usize) -> Option<&StopVisit<'a>> {
        self.visits.get(index)
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    /// Every visit carries a user distance.
    pub fn has_user_distance(&self) -> bool {
        self.visits.iter().all(|visit| visit.user_distance.is_some())
    }
}

/// Coordinates of the stop, or of its closest ancestor station that has them.
pub fn stop_or_parent_location(stops_by_id: &StopsById<'_>, stop_id: &str) -> Option<LatLng> {
    let mut current_id = stop_id;
    for _ in 0..MAX_PARENT_LEVELS {
        let stop = stops_by_id.get(current_id)?;
        if let (Some(lat), Some(lon)) = (stop.stop_lat, stop.stop_lon) {
            return Some(LatLng::new(lat, lon));
        }
        current_id = stop
            .parent_station
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(id: &str, coordinates: Option<(f64, f64)>, parent: Option<&str>) -> Stop {
        Stop {
            stop_id: id.to_string(),
            stop_name: Some(format!("Stop {id}")),
            stop_lat: coordinates.map(|c| c.0),
            stop_lon: coordinates.map(|c| c.1),
            parent_station: parent.map(str::to_string),
        }
    }

    fn stop_time(stop_id: &str, sequence: u32, distance: Option<f64>) -> StopTime {
        StopTime {
            trip_id: "trip".to_string(),
            stop_id: stop_id.to_string(),
            stop_sequence: sequence,
            shape_dist_traveled: distance,
        }
    }

    fn index(stops: &[Stop]) -> StopsById<'_> {
        stops.iter().map(|s| (s.stop_id.as_str(), s)).collect()
    }

    #[test]
    fn classifies_station_size_by_route_type() {
        assert_eq!(StationSize::for_route_type(RouteType::Rail), StationSize::Large);
        assert_eq!(
            StationSize::for_route_type(RouteType::Extended(401)),
            StationSize::Large
        );
        assert_eq!(StationSize::for_route_type(RouteType::Bus), StationSize::Small);
    }

    #[test]
    fn falls_back_to_ancestor_coordinates() {
        let stops = [
            stop("platform", None, Some("area")),
            stop("area", None, Some(" station ")),
            stop("station", Some((1.0, 2.0)), None),
            stop("orphan", None, None),
        ];
        let stops_by_id = index(&stops);

        assert_eq!(
            stop_or_parent_location(&stops_by_id, "platform"),
            Some(LatLng::new(1.0, 2.0))
        );
        assert_eq!(stop_or_parent_location(&stops_by_id, "orphan"), None);
        assert_eq!(stop_or_parent_location(&stops_by_id, "missing"), None);
    }

    #[test]
    fn stops_after_three_levels() {
        let stops = [
            stop("a", None, Some("b")),
            stop("b", None, Some("c")),
            stop("c", None, Some("d")),
            stop("d", Some((1.0, 1.0)), None),
        ];
        let stops_by_id = index(&stops);
        assert_eq!(stop_or_parent_location(&stops_by_id, "a"), None);
        assert!(stop_or_parent_location(&stops_by_id, "b").is_some());
    }

    #[test]
    fn orders_visits_and_widens_large_terminals() {
        let stops = [
            stop("s1", Some((0.0, 0.0)), None),
            stop("s2", Some((0.0, 0.01)), None),
            stop("s3", Some((0.0, 0.02)), None),
            stop("nowhere", None, None),
        ];
        let stops_by_id = index(&stops);
        let rows = [
            stop_time("s3", 3, Some(2.0)),
            stop_time("s1", 1, Some(0.0)),
            stop_time("nowhere", 4, Some(3.0)),
            stop_time("s2", 2, Some(1.0)),
        ];
        let stop_times: Vec<(u64, &StopTime)> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i as u64 + 2, row))
            .collect();
        let settings = StopToShapeMatcherSettings::default();

        let points =
            StopPoints::from_stop_times(&stop_times, &stops_by_id, StationSize::Large, &settings)
                .unwrap();
        let ids: Vec<&str> = points.visits().iter().map(|v| v.stop_id).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
        let tolerances: Vec<f64> = points
            .visits()
            .iter()
            .map(|v| v.snap_tolerance_meters)
            .collect();
        assert_eq!(tolerances, vec![400.0, 100.0, 400.0]);
        assert_eq!(points.visits()[0].csv_row_number, 3);
        assert!(points.has_user_distance());

        let small =
            StopPoints::from_stop_times(&stop_times, &stops_by_id, StationSize::Small, &settings)
                .unwrap();
        assert!(small
            .visits()
            .iter()
            .all(|v| v.snap_tolerance_meters == 100.0));
    }

    #[test]
    fn returns_none_without_positioned_visits() {
        let stops = [stop("nowhere", None, None)];
        let stops_by_id = index(&stops);
        let row = stop_time("nowhere", 1, None);
        let settings = StopToShapeMatcherSettings::default();
        assert!(StopPoints::from_stop_times(
            &[(2, &row)],
            &stops_by_id,
            StationSize::Small,
            &settings
        )
        .is_none());
    }

    #[test]
    fn partial_user_distance_is_not_parameterized() {
        let visit = |distance| StopVisit {
            location: LatLng::new(0.0, 0.0),
            stop_id: "s",
            stop_sequence: 1,
            user_distance: distance,
            snap_tolerance_meters: 100.0,
            csv_row_number: 2,
        };
        let points = StopPoints::new(vec![visit(Some(0.0)), visit(None)]).unwrap();
        assert!(!points.has_user_distance());
    }
}

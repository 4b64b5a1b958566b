use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use tracing::{debug, trace};

use gtfs_shapes_model::{Route, Shape, StopTime, Trip};

use crate::feed::TRIPS_FILE;
use crate::shape::{
    Match, MatchingDistance, Problem, ShapePoints, StationSize, StopPoints, StopToShapeMatcher,
    StopToShapeMatcherSettings, StopVisit, StopsById,
};
use crate::{GtfsFeed, NoticeContainer, NoticeSeverity, ValidationNotice, Validator};

pub const CODE_STOP_TOO_FAR_FROM_SHAPE: &str = "stop_too_far_from_shape";
pub const CODE_STOP_TOO_FAR_FROM_SHAPE_USER_DISTANCE: &str =
    "stop_too_far_from_shape_using_user_distance";
pub const CODE_STOP_HAS_TOO_MANY_MATCHES: &str = "stop_has_too_many_matches_for_shape";
pub const CODE_STOPS_MATCH_OUT_OF_ORDER: &str = "stops_match_shape_out_of_order";

#[derive(Debug, Default)]
pub struct ShapeToStopMatchingValidator {
    matcher: StopToShapeMatcher,
}

impl ShapeToStopMatchingValidator {
    pub fn new(settings: StopToShapeMatcherSettings) -> Self {
        Self {
            matcher: StopToShapeMatcher::new(settings),
        }
    }

    pub fn settings(&self) -> &StopToShapeMatcherSettings {
        self.matcher.settings()
    }
}

impl Validator for ShapeToStopMatchingValidator {
    fn name(&self) -> &'static str {
        "shape_to_stop_matching"
    }

    fn validate(&self, feed: &GtfsFeed, notices: &mut NoticeContainer) {
        let Some(index) = FeedIndex::new(feed) else {
            return;
        };
        let groups: Vec<(&str, &[(u64, &Trip)])> = index
            .trips_by_shape
            .iter()
            .map(|(shape_id, trips)| (*shape_id, trips.as_slice()))
            .collect();

        #[cfg(feature = "parallel")]
        let reports: Vec<ShapeGroupReport> = groups
            .par_iter()
            .map(|(shape_id, trips)| self.match_shape_group(&index, shape_id, trips))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let reports: Vec<ShapeGroupReport> = groups
            .iter()
            .map(|(shape_id, trips)| self.match_shape_group(&index, shape_id, trips))
            .collect();

        let mut patterns = 0;
        for report in reports {
            patterns += report.patterns;
            notices.merge(report.notices);
        }
        debug!(shapes = groups.len(), patterns, "shape to stop matching finished");
    }
}

/// Lookups shared by every shape group, keyed by trimmed ids.
struct FeedIndex<'a> {
    stops_by_id: StopsById<'a>,
    routes_by_id: FxHashMap<&'a str, &'a Route>,
    stop_times_by_trip: FxHashMap<&'a str, Vec<(u64, &'a StopTime)>>,
    shapes_by_id: FxHashMap<&'a str, Vec<&'a Shape>>,
    /// Trips in table order, grouped by shape in shape id order.
    trips_by_shape: BTreeMap<&'a str, Vec<(u64, &'a Trip)>>,
}

impl<'a> FeedIndex<'a> {
    fn new(feed: &'a GtfsFeed) -> Option<Self> {
        let shapes = feed.shapes.as_ref().filter(|shapes| !shapes.is_empty())?;
        if feed.stops.is_empty() || feed.trips.is_empty() || feed.stop_times.is_empty() {
            return None;
        }

        let mut stops_by_id = StopsById::default();
        for stop in &feed.stops.rows {
            let stop_id = stop.stop_id.trim();
            if !stop_id.is_empty() {
                stops_by_id.insert(stop_id, stop);
            }
        }

        let mut routes_by_id = FxHashMap::default();
        for route in &feed.routes.rows {
            let route_id = route.route_id.trim();
            if !route_id.is_empty() {
                routes_by_id.insert(route_id, route);
            }
        }

        let mut stop_times_by_trip: FxHashMap<&str, Vec<(u64, &StopTime)>> = FxHashMap::default();
        for (row_number, stop_time) in feed.stop_times.iter_with_rows() {
            let trip_id = stop_time.trip_id.trim();
            if trip_id.is_empty() {
                continue;
            }
            stop_times_by_trip
                .entry(trip_id)
                .or_default()
                .push((row_number, stop_time));
        }
        for stop_times in stop_times_by_trip.values_mut() {
            stop_times.sort_by_key(|(_, stop_time)| stop_time.stop_sequence);
        }

        let mut shapes_by_id: FxHashMap<&str, Vec<&Shape>> = FxHashMap::default();
        for shape in &shapes.rows {
            let shape_id = shape.shape_id.trim();
            if !shape_id.is_empty() {
                shapes_by_id.entry(shape_id).or_default().push(shape);
            }
        }

        let mut trips_by_shape: BTreeMap<&str, Vec<(u64, &Trip)>> = BTreeMap::new();
        for (row_number, trip) in feed.trips.iter_with_rows() {
            let Some(shape_id) = trip.shape_id.as_deref().map(str::trim) else {
                continue;
            };
            if shape_id.is_empty() || trip.trip_id.trim().is_empty() {
                continue;
            }
            trips_by_shape
                .entry(shape_id)
                .or_default()
                .push((row_number, trip));
        }

        Some(Self {
            stops_by_id,
            routes_by_id,
            stop_times_by_trip,
            shapes_by_id,
            trips_by_shape,
        })
    }
}

#[derive(Debug, Default)]
struct ShapeGroupReport {
    notices: NoticeContainer,
    /// Trips that reached the matcher or a replay.
    trips: usize,
    /// Distinct stop patterns the matcher actually ran for.
    patterns: usize,
}

/// Problems of one stop pattern, replayed for every trip sharing it.
struct PatternProblems {
    geo: Vec<Problem>,
    user: Option<Vec<Problem>>,
}

impl ShapeToStopMatchingValidator {
    fn match_shape_group<'a>(
        &self,
        index: &FeedIndex<'a>,
        shape_id: &'a str,
        trips: &[(u64, &'a Trip)],
    ) -> ShapeGroupReport {
        let mut report = ShapeGroupReport::default();
        let Some(rows) = index.shapes_by_id.get(shape_id) else {
            trace!(shape_id, "skipping trips of unknown shape");
            return report;
        };
        let Some(shape) = ShapePoints::from_shapes(rows.clone()) else {
            trace!(shape_id, "skipping shape with fewer than two points");
            return report;
        };

        let mut patterns: FxHashMap<u64, PatternProblems> = FxHashMap::default();
        let mut reported_too_far: FxHashSet<&'a str> = FxHashSet::default();
        for &(trip_row_number, trip) in trips {
            let trip_id = trip.trip_id.trim();
            let Some(stop_times) = index.stop_times_by_trip.get(trip_id) else {
                trace!(trip_id, "skipping trip without stop times");
                continue;
            };
            let Some(route) = index.routes_by_id.get(trip.route_id.trim()) else {
                trace!(trip_id, "skipping trip with unknown route");
                continue;
            };
            let station_size = StationSize::for_route_type(route.route_type);
            let Some(stops) = StopPoints::from_stop_times(
                stop_times,
                &index.stops_by_id,
                station_size,
                self.matcher.settings(),
            ) else {
                trace!(trip_id, "skipping trip without located stops");
                continue;
            };
            report.trips += 1;

            let fingerprint = pattern_fingerprint(stop_times, station_size);
            let problems = patterns.entry(fingerprint).or_insert_with(|| {
                let geo = self.matcher.match_using_geo_distance(&stops, &shape).problems;
                let user = (stops.has_user_distance() && shape.has_user_distance())
                    .then(|| self.matcher.match_using_user_distance(&stops, &shape).problems);
                PatternProblems { geo, user }
            });

            let trip_notices = TripNotices {
                shape_id,
                shape: &shape,
                trip,
                trip_row_number,
                stops: &stops,
                stops_by_id: &index.stops_by_id,
            };
            trip_notices.report(
                &problems.geo,
                MatchingDistance::Geo,
                &mut reported_too_far,
                &mut report.notices,
            );
            if let Some(user) = &problems.user {
                trip_notices.report(
                    user,
                    MatchingDistance::User,
                    &mut reported_too_far,
                    &mut report.notices,
                );
            }
        }

        report.patterns = patterns.len();
        debug!(
            shape_id,
            trips = report.trips,
            patterns = report.patterns,
            notices = report.notices.len(),
            "matched stops to shape"
        );
        report
    }
}

/// Identifies trips whose matching outcome is identical on a given shape.
fn pattern_fingerprint(stop_times: &[(u64, &StopTime)], station_size: StationSize) -> u64 {
    let mut hasher = FxHasher::default();
    station_size.hash(&mut hasher);
    stop_times.len().hash(&mut hasher);
    for (_, stop_time) in stop_times {
        stop_time.stop_id.trim().hash(&mut hasher);
        stop_time
            .shape_dist_traveled
            .map(f64::to_bits)
            .hash(&mut hasher);
    }
    hasher.finish()
}

/// Turns the problems of one pattern into notices for one trip.
struct TripNotices<'s, 'a> {
    shape_id: &'a str,
    shape: &'s ShapePoints,
    trip: &'a Trip,
    trip_row_number: u64,
    stops: &'s StopPoints<'a>,
    stops_by_id: &'s StopsById<'a>,
}

impl<'s, 'a> TripNotices<'s, 'a> {
    /// Too-far problems are reported once per stop and shape, whichever
    /// metric or trip finds them first.
    fn report(
        &self,
        problems: &[Problem],
        metric: MatchingDistance,
        reported_too_far: &mut FxHashSet<&'a str>,
        notices: &mut NoticeContainer,
    ) {
        for problem in problems {
            let Some(visit) = self.stops.get(problem.stop()) else {
                continue;
            };
            let notice = match problem {
                Problem::StopTooFarFromShape { matched, .. } => {
                    if !reported_too_far.insert(visit.stop_id) {
                        continue;
                    }
                    self.stop_too_far_from_shape_notice(metric, visit, matched)
                }
                Problem::StopHasTooManyMatches {
                    matched,
                    match_count,
                    ..
                } => self.stop_has_too_many_matches_notice(visit, matched, *match_count),
                Problem::StopsMatchOutOfOrder {
                    matched,
                    prev_stop,
                    prev_match,
                    ..
                } => {
                    let Some(prev_visit) = self.stops.get(*prev_stop) else {
                        continue;
                    };
                    self.stops_match_out_of_order_notice(visit, matched, prev_visit, prev_match)
                }
            };
            notices.push(notice);
        }
    }

    fn trip_notice(&self, code: &str, message: &str) -> ValidationNotice {
        ValidationNotice::new(code, NoticeSeverity::Warning, message)
            .with_location(TRIPS_FILE, self.trip_row_number)
            .with_context_field("tripCsvRowNumber", self.trip_row_number)
            .with_context_field("shapeId", self.shape_id)
            .with_context_field("tripId", self.trip.trip_id.as_str())
    }

    fn stop_name(&self, stop_id: &str) -> &str {
        self.stops_by_id
            .get(stop_id)
            .and_then(|stop| stop.stop_name.as_deref())
            .unwrap_or("")
    }

    fn insert_visit(&self, notice: &mut ValidationNotice, visit: &StopVisit<'_>, suffix: &str) {
        notice.insert_context_field(
            format!("stopTimeCsvRowNumber{suffix}"),
            visit.csv_row_number,
        );
        notice.insert_context_field(format!("stopId{suffix}"), visit.stop_id);
        notice.insert_context_field(format!("stopName{suffix}"), self.stop_name(visit.stop_id));
        notice.insert_context_field(format!("stopSequence{suffix}"), visit.stop_sequence);
    }

    fn stop_too_far_from_shape_notice(
        &self,
        metric: MatchingDistance,
        visit: &StopVisit<'_>,
        matched: &Match,
    ) -> ValidationNotice {
        let mut notice = match metric {
            MatchingDistance::Geo => {
                self.trip_notice(CODE_STOP_TOO_FAR_FROM_SHAPE, "stop is too far from shape")
            }
            MatchingDistance::User => self.trip_notice(
                CODE_STOP_TOO_FAR_FROM_SHAPE_USER_DISTANCE,
                "stop is too far from shape using user distance",
            ),
        };
        self.insert_visit(&mut notice, visit, "");
        notice.insert_context_field("stopLocation", visit.location.to_array());
        notice.insert_context_field("match", matched.location.to_array());
        notice.insert_context_field("geoDistanceToShape", matched.distance_to_shape);
        // Surrounding shape points, for drawing the problem on a map.
        notice.insert_context_field("shapePath", self.shape.excerpt_around(matched.index));
        notice.insert_context_field("matchIndex", matched.index);
        notice
    }

    fn stop_has_too_many_matches_notice(
        &self,
        visit: &StopVisit<'_>,
        matched: &Match,
        match_count: usize,
    ) -> ValidationNotice {
        let mut notice = self.trip_notice(
            CODE_STOP_HAS_TOO_MANY_MATCHES,
            "stop has too many matches for shape",
        );
        self.insert_visit(&mut notice, visit, "");
        notice.insert_context_field("match", matched.location.to_array());
        notice.insert_context_field("matchCount", match_count);
        notice
    }

    fn stops_match_out_of_order_notice(
        &self,
        visit: &StopVisit<'_>,
        matched: &Match,
        prev_visit: &StopVisit<'_>,
        prev_match: &Match,
    ) -> ValidationNotice {
        let mut notice =
            self.trip_notice(CODE_STOPS_MATCH_OUT_OF_ORDER, "stops match shape out of order");
        self.insert_visit(&mut notice, visit, "1");
        notice.insert_context_field("match1", matched.location.to_array());
        self.insert_visit(&mut notice, prev_visit, "2");
        notice.insert_context_field("match2", prev_match.location.to_array());
        notice
    }
}

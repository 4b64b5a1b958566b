use rstar::{RTree, RTreeObject, AABB};

use gtfs_shapes_model::Shape;

use crate::geo::{
    buffered_point_envelopes, closest_point_on_segment, distance_meters, interpolate,
    near_by_fraction_or_margin, segment_envelope, LatLng,
};

/// One vertex of a shape polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub location: LatLng,
    pub sequence: u32,
    /// Great-circle arc length from the first point, in meters.
    pub geo_distance: f64,
    /// Producer supplied `shape_dist_traveled`, made non-decreasing.
    pub user_distance: Option<f64>,
}

/// Where a stop landed on a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Segment holding the match, `points[index]..points[index + 1]`.
    pub index: usize,
    pub location: LatLng,
    /// Distance along the path in the metric the match was made with.
    pub position: f64,
    pub geo_distance: f64,
    pub distance_to_shape: f64,
    /// Distinct equally good candidates the match was picked from.
    pub candidate_count: usize,
}

impl Match {
    pub(crate) fn unmatched() -> Self {
        Self {
            index: 0,
            location: LatLng::new(0.0, 0.0),
            position: 0.0,
            geo_distance: 0.0,
            distance_to_shape: f64::INFINITY,
            candidate_count: 1,
        }
    }

    fn keep_best_match(&mut self, location: LatLng, distance_to_shape: f64, index: usize) {
        if distance_to_shape < self.distance_to_shape {
            self.distance_to_shape = distance_to_shape;
            self.location = location;
            self.index = index;
        }
    }

    pub(crate) fn is_matched(&self) -> bool {
        self.distance_to_shape.is_finite()
    }
}

#[derive(Debug, Clone, Copy)]
struct ShapeSegment {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for ShapeSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Ordered points of one shape with a spatial index over its segments.
#[derive(Debug)]
pub struct ShapePoints {
    points: Vec<PathPoint>,
    segments: RTree<ShapeSegment>,
}

impl ShapePoints {
    /// Builds the path for the rows of one shape, in `shape_pt_sequence`
    /// order. Returns `None` when fewer than two points remain.
    pub fn from_shapes(mut rows: Vec<&Shape>) -> Option<Self> {
        rows.sort_by_key(|row| row.shape_pt_sequence);
        let fully_parameterized = rows.iter().all(|row| row.shape_dist_traveled.is_some());
        Self::from_points(rows.iter().map(|row| {
            (
                row.shape_pt_sequence,
                LatLng::new(row.shape_pt_lat, row.shape_pt_lon),
                row.shape_dist_traveled.filter(|_| fully_parameterized),
            )
        }))
    }

    /// Builds the path from `(sequence, location, user distance)` triples that
    /// are already in path order.
    pub fn from_points(
        points: impl IntoIterator<Item = (u32, LatLng, Option<f64>)>,
    ) -> Option<Self> {
        let mut path: Vec<PathPoint> = Vec::new();
        let mut geo_distance = 0.0_f64;
        let mut max_user_distance = f64::NEG_INFINITY;
        for (sequence, location, user_distance) in points {
            if let Some(previous) = path.last() {
                geo_distance += distance_meters(previous.location, location);
            }
            let user_distance = user_distance.map(|distance| {
                max_user_distance = max_user_distance.max(distance);
                max_user_distance
            });
            path.push(PathPoint {
                location,
                sequence,
                geo_distance,
                user_distance,
            });
        }
        if path.len() < 2 {
            return None;
        }

        let segments = path
            .windows(2)
            .enumerate()
            .map(|(index, pair)| ShapeSegment {
                index,
                envelope: segment_envelope(pair[0].location, pair[1].location),
            })
            .collect();
        Some(Self {
            points: path,
            segments: RTree::bulk_load(segments),
        })
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Every point carries a user distance.
    pub fn has_user_distance(&self) -> bool {
        self.points.iter().all(|point| point.user_distance.is_some())
    }

    /// Indices, ascending, of segments that may pass within `tolerance_meters`
    /// of `location`. Same test as `geo::buffered_corridor_contains`, answered
    /// from the segment tree instead of a scan.
    fn candidate_segments(&self, location: LatLng, tolerance_meters: f64) -> Vec<usize> {
        let mut indices: Vec<usize> = buffered_point_envelopes(location, tolerance_meters)
            .iter()
            .flat_map(|envelope| self.segments.locate_in_envelope_intersecting(envelope))
            .map(|segment| segment.index)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Closest point of the whole path to `location`.
    pub fn match_from_location(&self, location: LatLng) -> Match {
        let mut best_match = Match::unmatched();
        for (index, pair) in self.points.windows(2).enumerate() {
            let (closest, distance) =
                closest_point_on_segment(location, pair[0].location, pair[1].location);
            best_match.keep_best_match(closest, distance, index);
        }
        self.fill_location_match(&mut best_match);
        best_match
    }

    /// Local minima of the distance from `location` to the path, among the
    /// points within `max_distance` meters, in path order.
    ///
    /// A run of consecutive segments within range yields a single candidate
    /// unless the path moves away from the stop and comes back inside the run.
    pub fn matches_from_location(&self, location: LatLng, max_distance: f64) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut local_match = Match::unmatched();
        let mut previous_index: Option<usize> = None;
        let mut distance_to_end_previous_segment = f64::INFINITY;
        let mut previous_segment_getting_further_away = false;

        for index in self.candidate_segments(location, max_distance) {
            if previous_index.is_some_and(|previous| previous + 1 != index) {
                // The path left the corridor between the two segments.
                if local_match.is_matched() {
                    matches.push(local_match);
                    local_match = Match::unmatched();
                }
                distance_to_end_previous_segment = f64::INFINITY;
                previous_segment_getting_further_away = false;
            }

            let right = self.points[index + 1].location;
            let (closest, distance) =
                closest_point_on_segment(location, self.points[index].location, right);
            if distance <= max_distance {
                if local_match.is_matched()
                    && previous_segment_getting_further_away
                    && distance < distance_to_end_previous_segment
                {
                    matches.push(local_match);
                    local_match = Match::unmatched();
                }
                local_match.keep_best_match(closest, distance, index);
            } else if local_match.is_matched() {
                matches.push(local_match);
                local_match = Match::unmatched();
            }

            distance_to_end_previous_segment = distance_meters(location, right);
            previous_segment_getting_further_away = distance_to_end_previous_segment > distance;
            previous_index = Some(index);
        }
        if local_match.is_matched() {
            matches.push(local_match);
        }

        for candidate in &mut matches {
            self.fill_location_match(candidate);
        }
        matches
    }

    /// Points of every segment whose user distance range contains
    /// `user_distance`. Values outside the path's range land on its nearest
    /// end.
    pub fn matches_from_user_distance(&self, user_distance: f64, stop_location: LatLng) -> Vec<Match> {
        let first = self.user_distance_at(0);
        let last_index = self.points.len() - 1;
        let last = self.user_distance_at(last_index);
        if user_distance < first && !near_by_fraction_or_margin(user_distance, first) {
            return vec![self.interpolate(0, 0.0, stop_location)];
        }
        if user_distance > last && !near_by_fraction_or_margin(user_distance, last) {
            return vec![self.interpolate(last_index - 1, 1.0, stop_location)];
        }

        let first_reaching = self.points.partition_point(|point| {
            let distance = point.user_distance.unwrap_or(0.0);
            distance < user_distance && !near_by_fraction_or_margin(distance, user_distance)
        });
        let mut matches = Vec::new();
        for index in first_reaching.saturating_sub(1)..self.segment_count() {
            let low = self.user_distance_at(index);
            if low > user_distance && !near_by_fraction_or_margin(low, user_distance) {
                break;
            }
            let high = self.user_distance_at(index + 1);
            if high < user_distance && !near_by_fraction_or_margin(high, user_distance) {
                continue;
            }
            let fraction = if near_by_fraction_or_margin(low, high) {
                0.0
            } else {
                ((user_distance - low) / (high - low)).clamp(0.0, 1.0)
            };
            matches.push(self.interpolate(index, fraction, stop_location));
        }
        matches
    }

    /// Shape coordinates within ten points and 500 m of either side of the
    /// given segment, as `[lat, lon]` pairs.
    pub fn excerpt_around(&self, segment_index: usize) -> Vec<[f64; 2]> {
        const MAX_POINTS_EACH_SIDE: usize = 10;
        const MAX_DISTANCE_METERS: f64 = 500.0;

        let center = segment_index.min(self.points.len() - 1);
        let center_distance = self.points[center].geo_distance;

        let mut start = center;
        for index in (0..center).rev() {
            if center_distance - self.points[index].geo_distance > MAX_DISTANCE_METERS
                || center - index > MAX_POINTS_EACH_SIDE
            {
                break;
            }
            start = index;
        }
        let mut end = center;
        for index in (center + 1)..self.points.len() {
            if self.points[index].geo_distance - center_distance > MAX_DISTANCE_METERS
                || index - center > MAX_POINTS_EACH_SIDE
            {
                break;
            }
            end = index;
        }

        self.points[start..=end]
            .iter()
            .map(|point| point.location.to_array())
            .collect()
    }

    fn user_distance_at(&self, index: usize) -> f64 {
        self.points[index].user_distance.unwrap_or(0.0)
    }

    fn interpolate(&self, index: usize, fraction: f64, stop_location: LatLng) -> Match {
        let previous = self.points[index];
        let next = self.points.get(index + 1).copied().unwrap_or(previous);
        let location = if previous.location.approx_equals(next.location) {
            previous.location
        } else {
            interpolate(previous.location, next.location, fraction)
        };
        let previous_user = previous.user_distance.unwrap_or(0.0);
        let next_user = next.user_distance.unwrap_or(previous_user);
        Match {
            index,
            location,
            position: previous_user + fraction * (next_user - previous_user),
            geo_distance: previous.geo_distance
                + fraction * (next.geo_distance - previous.geo_distance),
            distance_to_shape: distance_meters(stop_location, location),
            candidate_count: 1,
        }
    }

    fn fill_location_match(&self, candidate: &mut Match) {
        let start = self.points[candidate.index];
        candidate.geo_distance = start.geo_distance + distance_meters(start.location, candidate.location);
        candidate.position = candidate.geo_distance;
    }
}

use super::{Match, Problem, ShapePoints, StopPoints, StopToShapeMatcherSettings};
use crate::geo::{cmp_f64, distance_meters, near_by_fraction_or_margin};

/// Tied candidates closer than this to each other count as one.
const SAME_LOCATION_METERS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingDistance {
    /// Great-circle arc length along the shape.
    Geo,
    /// Producer supplied `shape_dist_traveled`.
    User,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    /// One match per visit, in visit order.
    pub matches: Vec<Match>,
    pub problems: Vec<Problem>,
}

#[derive(Debug, Clone, Default)]
pub struct StopToShapeMatcher {
    settings: StopToShapeMatcherSettings,
}

impl StopToShapeMatcher {
    pub fn new(settings: StopToShapeMatcherSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &StopToShapeMatcherSettings {
        &self.settings
    }

    pub fn match_using_geo_distance(&self, stops: &StopPoints<'_>, shape: &ShapePoints) -> MatchResult {
        self.match_stops(stops, shape, MatchingDistance::Geo)
    }

    pub fn match_using_user_distance(&self, stops: &StopPoints<'_>, shape: &ShapePoints) -> MatchResult {
        self.match_stops(stops, shape, MatchingDistance::User)
    }

    /// Matches every visit in a single pass along the shape.
    ///
    /// Each visit takes its best candidate, preferring among ties the first
    /// one that does not move backwards. A visit that lands behind the last
    /// accepted position is out of order and leaves that position unchanged.
    /// Under the user metric a visit without a user distance is matched
    /// geographically and only checked for distance.
    pub fn match_stops(
        &self,
        stops: &StopPoints<'_>,
        shape: &ShapePoints,
        metric: MatchingDistance,
    ) -> MatchResult {
        let mut result = MatchResult {
            matches: Vec::with_capacity(stops.len()),
            problems: Vec::new(),
        };
        let mut last_position = match metric {
            MatchingDistance::Geo => 0.0,
            MatchingDistance::User => shape.points()[0].user_distance.unwrap_or(0.0),
        };
        let mut last_accepted: Option<(usize, Match)> = None;

        for (stop, visit) in stops.visits().iter().enumerate() {
            let user_distance = match metric {
                MatchingDistance::Geo => None,
                MatchingDistance::User => visit.user_distance,
            };
            let ordered = metric == MatchingDistance::Geo || user_distance.is_some();
            let candidates = match user_distance {
                Some(distance) => shape.matches_from_user_distance(distance, visit.location),
                None => shape.matches_from_location(visit.location, visit.snap_tolerance_meters),
            };

            let Some(matched) = self.select(&candidates, last_position, metric) else {
                let nearest = shape.match_from_location(visit.location);
                result.problems.push(Problem::StopTooFarFromShape {
                    stop,
                    matched: nearest,
                });
                if ordered {
                    last_position = nearest.position;
                    last_accepted = Some((stop, nearest));
                }
                result.matches.push(nearest);
                continue;
            };

            if matched.candidate_count > self.settings.potential_matches_for_stop_problem_threshold
            {
                result.problems.push(Problem::StopHasTooManyMatches {
                    stop,
                    matched,
                    match_count: matched.candidate_count,
                });
            }

            if matched.distance_to_shape > visit.snap_tolerance_meters {
                result
                    .problems
                    .push(Problem::StopTooFarFromShape { stop, matched });
                if ordered {
                    last_position = matched.position;
                    last_accepted = Some((stop, matched));
                }
            } else if ordered {
                if self.is_behind(matched.position, last_position, metric) {
                    if let Some((prev_stop, prev_match)) = last_accepted {
                        result.problems.push(Problem::StopsMatchOutOfOrder {
                            stop,
                            matched,
                            prev_stop,
                            prev_match,
                        });
                    }
                } else if matched.position > last_position || last_accepted.is_none() {
                    // Backtracks within tolerance are accepted but never pull
                    // the baseline back.
                    last_position = last_position.max(matched.position);
                    last_accepted = Some((stop, matched));
                }
            }
            result.matches.push(matched);
        }
        result
    }

    /// Best candidate, with `candidate_count` set to the number of distinct
    /// candidates tied with it.
    fn select(&self, candidates: &[Match], last_position: f64, metric: MatchingDistance) -> Option<Match> {
        let best = candidates
            .iter()
            .map(|candidate| candidate.distance_to_shape)
            .min_by(|a, b| cmp_f64(*a, *b))?;
        let margin = (self.settings.tie_relative_epsilon * best)
            .max(self.settings.tie_absolute_epsilon_meters);

        let mut ties: Vec<&Match> = Vec::new();
        for candidate in candidates {
            if candidate.distance_to_shape - best > margin {
                continue;
            }
            let seen = ties.iter().any(|tie| {
                distance_meters(tie.location, candidate.location) <= SAME_LOCATION_METERS
            });
            if !seen {
                ties.push(candidate);
            }
        }

        let primary = ties
            .iter()
            .find(|tie| !self.is_behind(tie.position, last_position, metric))
            .or_else(|| ties.first())?;
        Some(Match {
            candidate_count: ties.len(),
            ..**primary
        })
    }

    fn is_behind(&self, position: f64, last_position: f64, metric: MatchingDistance) -> bool {
        match metric {
            MatchingDistance::Geo => {
                position < last_position - self.settings.out_of_order_tolerance_meters
            }
            MatchingDistance::User => {
                position < last_position && !near_by_fraction_or_margin(position, last_position)
            }
        }
    }
}

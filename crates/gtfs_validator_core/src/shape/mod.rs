//! Matching of a trip's stop visits against its shape polyline.

mod matcher;
mod problem;
mod settings;
mod shape_points;
mod stop_points;

pub use matcher::{MatchResult, MatchingDistance, StopToShapeMatcher};
pub use problem::{Problem, ProblemKind};
pub use settings::{SettingsError, StopToShapeMatcherSettings};
pub use shape_points::{Match, PathPoint, ShapePoints};
pub use stop_points::{stop_or_parent_location, StationSize, StopPoints, StopVisit, StopsById};

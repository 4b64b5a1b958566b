//! Checks that the stops of every GTFS trip lie along the trip's shape, in
//! order.

pub mod feed;
pub mod geo;
pub mod notice;
pub mod rules;
pub mod shape;
mod validator;

pub use feed::{CsvTable, FeedLoadError, GtfsFeed};
pub use gtfs_shapes_model as model;
pub use notice::{NoticeContainer, NoticeSeverity, ValidationNotice};
pub use rules::ShapeToStopMatchingValidator;
pub use shape::{
    Match, MatchResult, MatchingDistance, Problem, ProblemKind, SettingsError, ShapePoints,
    StopPoints, StopToShapeMatcher, StopToShapeMatcherSettings,
};
pub use validator::{Validator, ValidatorRunner};

pub mod shape_to_stop_matching;

pub use shape_to_stop_matching::ShapeToStopMatchingValidator;

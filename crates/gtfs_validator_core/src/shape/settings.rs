use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StationSize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopToShapeMatcherSettings {
    pub max_distance_from_stop_to_shape_meters: f64,
    /// Applied to the first and last visit of a trip at a large station.
    pub large_station_distance_multiplier: f64,
    pub potential_matches_for_stop_problem_threshold: usize,
    /// Candidates within `max(relative * best, absolute)` of the best distance
    /// are ties.
    pub tie_relative_epsilon: f64,
    pub tie_absolute_epsilon_meters: f64,
    /// Backtracking allowed along the shape before two geographic matches are
    /// out of order.
    pub out_of_order_tolerance_meters: f64,
}

impl Default for StopToShapeMatcherSettings {
    fn default() -> Self {
        Self {
            max_distance_from_stop_to_shape_meters: 100.0,
            large_station_distance_multiplier: 4.0,
            potential_matches_for_stop_problem_threshold: 1,
            tie_relative_epsilon: 0.01,
            tie_absolute_epsilon_meters: 0.5,
            out_of_order_tolerance_meters: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidDistance { field: &'static str, value: f64 },
    #[error("large_station_distance_multiplier must be at least 1, got {0}")]
    InvalidMultiplier(f64),
}

impl StopToShapeMatcherSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let distances = [
            (
                "max_distance_from_stop_to_shape_meters",
                self.max_distance_from_stop_to_shape_meters,
            ),
            ("tie_relative_epsilon", self.tie_relative_epsilon),
            ("tie_absolute_epsilon_meters", self.tie_absolute_epsilon_meters),
            (
                "out_of_order_tolerance_meters",
                self.out_of_order_tolerance_meters,
            ),
        ];
        for (field, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::InvalidDistance { field, value });
            }
        }
        let multiplier = self.large_station_distance_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(SettingsError::InvalidMultiplier(multiplier));
        }
        Ok(())
    }

    /// Maximum distance between a visit and its match before the visit is
    /// reported as too far from the shape.
    pub fn snap_tolerance(&self, station_size: StationSize, is_terminal: bool) -> f64 {
        let base = self.max_distance_from_stop_to_shape_meters;
        if station_size == StationSize::Large && is_terminal {
            base * self.large_station_distance_multiplier
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = StopToShapeMatcherSettings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.max_distance_from_stop_to_shape_meters, 100.0);
    }

    #[test]
    fn rejects_negative_and_non_finite_values() {
        let settings = StopToShapeMatcherSettings {
            max_distance_from_stop_to_shape_meters: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidDistance {
                field: "max_distance_from_stop_to_shape_meters",
                ..
            })
        ));

        let settings = StopToShapeMatcherSettings {
            tie_absolute_epsilon_meters: f64::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = StopToShapeMatcherSettings {
            large_station_distance_multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidMultiplier(0.5))
        );
    }

    #[test]
    fn widens_tolerance_only_for_large_terminals() {
        let settings = StopToShapeMatcherSettings::default();
        assert_eq!(settings.snap_tolerance(StationSize::Large, true), 400.0);
        assert_eq!(settings.snap_tolerance(StationSize::Large, false), 100.0);
        assert_eq!(settings.snap_tolerance(StationSize::Small, true), 100.0);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let settings: StopToShapeMatcherSettings =
            serde_json::from_str(r#"{"max_distance_from_stop_to_shape_meters": 50}"#).unwrap();
        assert_eq!(settings.max_distance_from_stop_to_shape_meters, 50.0);
        assert_eq!(settings.large_station_distance_multiplier, 4.0);
    }
}

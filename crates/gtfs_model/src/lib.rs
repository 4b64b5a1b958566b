//! Typed rows of the GTFS tables consumed by the shape matching engine.
//!
//! Only the columns the engine reads are modelled; unknown columns are ignored
//! by the deserializer.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Trolleybus,
    Monorail,
    Extended(u16),
    Unknown,
}

impl RouteType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => RouteType::Tram,
            1 => RouteType::Subway,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableCar,
            6 => RouteType::Gondola,
            7 => RouteType::Funicular,
            11 => RouteType::Trolleybus,
            12 => RouteType::Monorail,
            100..=1702 => RouteType::Extended(value as u16),
            _ => RouteType::Unknown,
        }
    }

    /// Heavy or urban rail, including the extended railway (100-199) and
    /// metro/urban railway (400-499) ranges.
    pub fn is_rail_based(self) -> bool {
        match self {
            RouteType::Rail | RouteType::Subway | RouteType::Monorail => true,
            RouteType::Extended(code) => (100..200).contains(&code) || (400..500).contains(&code),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for RouteType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteTypeVisitor;

        impl<'de> Visitor<'de> for RouteTypeVisitor {
            type Value = RouteType;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS route_type numeric value")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RouteType, E> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(E::custom("empty route_type"));
                }
                let parsed: i32 = trimmed.parse().map_err(E::custom)?;
                Ok(RouteType::from_i32(parsed))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<RouteType, E> {
                Ok(i32::try_from(value).map_or(RouteType::Unknown, RouteType::from_i32))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<RouteType, E> {
                Ok(i32::try_from(value).map_or(RouteType::Unknown, RouteType::from_i32))
            }
        }

        deserializer.deserialize_any(RouteTypeVisitor)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub route_type: RouteType,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            route_id: String::new(),
            route_short_name: None,
            route_type: RouteType::Bus,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub shape_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub shape_dist_traveled: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Shape {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
    pub shape_dist_traveled: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_route_type_codes() {
        assert_eq!(RouteType::from_i32(2), RouteType::Rail);
        assert_eq!(RouteType::from_i32(3), RouteType::Bus);
        assert_eq!(RouteType::from_i32(401), RouteType::Extended(401));
        assert_eq!(RouteType::from_i32(9), RouteType::Unknown);
    }

    #[test]
    fn classifies_rail_based_modes() {
        assert!(RouteType::Rail.is_rail_based());
        assert!(RouteType::Subway.is_rail_based());
        assert!(RouteType::Extended(109).is_rail_based());
        assert!(RouteType::Extended(401).is_rail_based());
        assert!(!RouteType::Bus.is_rail_based());
        assert!(!RouteType::Extended(700).is_rail_based());
        assert!(!RouteType::Tram.is_rail_based());
    }

    #[test]
    fn out_of_range_numeric_route_type_is_unknown() {
        use serde::de::value::{Error, I64Deserializer, U64Deserializer};
        use serde::de::IntoDeserializer;

        let wide: U64Deserializer<Error> = 4_294_967_298u64.into_deserializer();
        assert_eq!(RouteType::deserialize(wide).unwrap(), RouteType::Unknown);
        let negative: I64Deserializer<Error> = (-4_294_967_294i64).into_deserializer();
        assert_eq!(RouteType::deserialize(negative).unwrap(), RouteType::Unknown);
        let rail: U64Deserializer<Error> = 2u64.into_deserializer();
        assert_eq!(RouteType::deserialize(rail).unwrap(), RouteType::Rail);
    }
}

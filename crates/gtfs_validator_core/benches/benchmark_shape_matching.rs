use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gtfs_shapes_core::geo::LatLng;
use gtfs_shapes_core::model::{Route, RouteType, Shape, Stop, StopTime, Trip};
use gtfs_shapes_core::shape::{ShapePoints, StopPoints, StopVisit};
use gtfs_shapes_core::{
    CsvTable, GtfsFeed, NoticeContainer, ShapeToStopMatchingValidator, StopToShapeMatcher,
    Validator,
};

/// Zigzag shapes with a stop near every tenth point. Trips of a shape share
/// one stop pattern except every `distinct_every`th, which shifts its
/// distances.
fn generate_complex_feed(
    num_shapes: usize,
    points_per_shape: usize,
    trips_per_shape: usize,
    distinct_every: usize,
) -> GtfsFeed {
    let mut shapes = Vec::new();
    let mut stops = Vec::new();
    let mut trips = Vec::new();
    let mut stop_times = Vec::new();
    let routes = vec![Route {
        route_id: "R1".to_string(),
        route_short_name: Some("R1".to_string()),
        route_type: RouteType::Bus,
    }];

    for shape_index in 0..num_shapes {
        let shape_id = format!("S{shape_index}");
        for i in 0..points_per_shape {
            shapes.push(Shape {
                shape_id: shape_id.clone(),
                shape_pt_lat: i as f64 * 0.001,
                shape_pt_lon: if i % 2 == 0 { 0.0 } else { 0.001 },
                shape_pt_sequence: i as u32,
                shape_dist_traveled: Some(i as f64 * 100.0),
            });
        }

        for i in (0..points_per_shape).step_by(10) {
            let stop_id = format!("STOP_{shape_id}_{i}");
            stops.push(Stop {
                stop_id: stop_id.clone(),
                stop_name: Some(stop_id),
                stop_lat: Some(i as f64 * 0.001),
                stop_lon: Some(if i % 2 == 0 { 0.0001 } else { 0.0009 }),
                parent_station: None,
            });
        }

        for t in 0..trips_per_shape {
            let trip_id = format!("T_{shape_id}_{t}");
            trips.push(Trip {
                route_id: "R1".to_string(),
                service_id: "SVC1".to_string(),
                trip_id: trip_id.clone(),
                shape_id: Some(shape_id.clone()),
            });
            let shift = if t % distinct_every == 0 { t as f64 } else { 0.0 };
            for i in (0..points_per_shape).step_by(10) {
                stop_times.push(StopTime {
                    trip_id: trip_id.clone(),
                    stop_id: format!("STOP_{shape_id}_{i}"),
                    stop_sequence: (i / 10) as u32,
                    shape_dist_traveled: Some(i as f64 * 100.0 + shift),
                });
            }
        }
    }

    GtfsFeed {
        stops: CsvTable::from_rows(stops),
        routes: CsvTable::from_rows(routes),
        trips: CsvTable::from_rows(trips),
        stop_times: CsvTable::from_rows(stop_times),
        shapes: Some(CsvTable::from_rows(shapes)),
    }
}

fn benchmark_validation(c: &mut Criterion) {
    let feed = generate_complex_feed(5, 1000, 5, 1);
    let validator = ShapeToStopMatchingValidator::default();
    c.bench_function("shape_matching_5_shapes_1000_pts", |b| {
        b.iter(|| {
            let mut notices = NoticeContainer::new();
            validator.validate(&feed, &mut notices);
            notices
        })
    });

    // Many trips collapsing onto a few patterns.
    let feed = generate_complex_feed(5, 1000, 500, 50);
    c.bench_function("shape_matching_5_shapes_500_trips_replayed", |b| {
        b.iter(|| {
            let mut notices = NoticeContainer::new();
            validator.validate(&feed, &mut notices);
            notices
        })
    });
}

fn benchmark_matcher(c: &mut Criterion) {
    let shape = ShapePoints::from_points((0..5000u32).map(|i| {
        let lon = if i % 2 == 0 { 0.0 } else { 0.001 };
        (i, LatLng::new(f64::from(i) * 0.001, lon), None)
    }))
    .expect("benchmark shape has points");
    let visits = (0..500u32)
        .map(|i| StopVisit {
            location: LatLng::new(f64::from(i) * 0.01, 0.0001),
            stop_id: "stop",
            stop_sequence: i,
            user_distance: None,
            snap_tolerance_meters: 100.0,
            csv_row_number: u64::from(i) + 2,
        })
        .collect();
    let stops = StopPoints::new(visits).expect("benchmark trip has stops");
    let matcher = StopToShapeMatcher::default();

    c.bench_function("geo_matching_5000_pts_500_stops", |b| {
        b.iter(|| matcher.match_using_geo_distance(black_box(&stops), black_box(&shape)))
    });
}

criterion_group!(benches, benchmark_validation, benchmark_matcher);
criterion_main!(benches);

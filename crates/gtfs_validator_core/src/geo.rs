//! Great-circle geometry on a spherical earth.
//!
//! Points are converted to unit vectors and all distances are computed as
//! `atan2(|a x b|, a . b)`, which stays accurate from sub-meter offsets up to
//! antipodal points.

use std::cmp::Ordering;

use rstar::{Envelope, AABB};
use serde::Serialize;

pub const EARTH_RADIUS_METERS: f64 = 6_371_010.0;

/// Length of one degree of latitude (and of longitude on the equator).
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

/// Widening applied to query envelopes so that rounding never drops a segment
/// that is within tolerance.
const ENVELOPE_SLACK: f64 = 1.01;
const ENVELOPE_SLACK_DEGREES: f64 = 1e-9;

/// Below this cosine a buffered envelope covers every longitude.
const MIN_LONGITUDE_COSINE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn approx_equals(self, other: Self) -> bool {
        (self.lat - other.lat).abs() < 1e-9 && (self.lon - other.lon).abs() < 1e-9
    }

    /// `[lat, lon]`, the layout used in notice context fields.
    pub fn to_array(self) -> [f64; 2] {
        [self.lat, self.lon]
    }

    fn to_vec(self) -> Vec3 {
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        let cos_lat = lat.cos();
        Vec3 {
            x: cos_lat * lon.cos(),
            y: cos_lat * lon.sin(),
            z: lat.sin(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    const Z_AXIS: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    fn normalize(self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return self;
        }
        self.scale(1.0 / norm)
    }

    fn scale(self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    fn sub(self, other: Self) -> Self {
        self.add(other.neg())
    }

    fn neg(self) -> Self {
        self.scale(-1.0)
    }

    fn to_lat_lng(self) -> LatLng {
        let normalized = self.normalize();
        LatLng {
            lat: normalized.z.clamp(-1.0, 1.0).asin().to_degrees(),
            lon: normalized.y.atan2(normalized.x).to_degrees(),
        }
    }
}

fn angular_distance(a: Vec3, b: Vec3) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

fn distance_meters_vec(a: Vec3, b: Vec3) -> f64 {
    angular_distance(a, b) * EARTH_RADIUS_METERS
}

/// True when `point` lies on the minor arc `a..b` (all unit vectors).
fn is_on_arc(point: Vec3, a: Vec3, b: Vec3) -> bool {
    angular_distance(a, point) + angular_distance(point, b) <= angular_distance(a, b) + 1e-12
}

/// Great-circle distance in meters.
pub fn distance_meters(a: LatLng, b: LatLng) -> f64 {
    distance_meters_vec(a.to_vec(), b.to_vec())
}

pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Closest point to `point` on the great-circle arc from `left` to `right`,
/// together with its distance in meters.
pub fn closest_point_on_segment(point: LatLng, left: LatLng, right: LatLng) -> (LatLng, f64) {
    let p = point.to_vec();
    let a = left.to_vec();
    let b = right.to_vec();
    let n = a.cross(b);
    let n_norm = n.norm();
    if n_norm == 0.0 {
        return (left, distance_meters_vec(p, a));
    }
    let n_unit = n.scale(1.0 / n_norm);
    let m = n_unit.cross(p);
    if m.norm() == 0.0 {
        // `point` is a pole of the arc's great circle, every arc point is equidistant.
        let dist_a = distance_meters_vec(p, a);
        let dist_b = distance_meters_vec(p, b);
        return if dist_a <= dist_b {
            (left, dist_a)
        } else {
            (right, dist_b)
        };
    }
    let mut q = m.cross(n_unit).normalize();
    if q.dot(p) < 0.0 {
        q = q.neg();
    }

    if is_on_arc(q, a, b) {
        return (q.to_lat_lng(), distance_meters_vec(p, q));
    }
    let dist_a = distance_meters_vec(p, a);
    let dist_b = distance_meters_vec(p, b);
    if dist_a <= dist_b {
        (left, dist_a)
    } else {
        (right, dist_b)
    }
}

/// Spherical linear interpolation between `a` (fraction 0) and `b` (fraction 1).
pub fn interpolate(a: LatLng, b: LatLng, fraction: f64) -> LatLng {
    let a_vec = a.to_vec();
    let b_vec = b.to_vec();
    let theta = a_vec.dot(b_vec).clamp(-1.0, 1.0).acos();
    if theta.abs() < 1e-12 {
        return a;
    }
    let sin_theta = theta.sin();
    let w1 = ((1.0 - fraction) * theta).sin() / sin_theta;
    let w2 = (fraction * theta).sin() / sin_theta;
    a_vec.scale(w1).add(b_vec.scale(w2)).to_lat_lng()
}

/// Latitude of the most poleward point of the arc `a..b` when it lies strictly
/// inside the arc rather than at one of its ends.
fn arc_latitude_extremum(a: LatLng, b: LatLng) -> Option<f64> {
    let a_vec = a.to_vec();
    let b_vec = b.to_vec();
    let n = a_vec.cross(b_vec);
    let n_norm = n.norm();
    if n_norm == 0.0 {
        return None;
    }
    let n_unit = n.scale(1.0 / n_norm);
    // Projection of the z axis onto the great circle plane: its northernmost point.
    let north = Vec3::Z_AXIS.sub(n_unit.scale(n_unit.z));
    if north.norm() < 1e-15 {
        return None;
    }
    let north = north.normalize();
    [north, north.neg()]
        .into_iter()
        .find(|vertex| is_on_arc(*vertex, a_vec, b_vec))
        .map(|vertex| vertex.to_lat_lng().lat)
}

/// Bounding box, as `[lon, lat]` corners, of the arc `a..b`.
pub fn segment_envelope(a: LatLng, b: LatLng) -> AABB<[f64; 2]> {
    let mut min_lat = a.lat.min(b.lat);
    let mut max_lat = a.lat.max(b.lat);
    if let Some(extremum) = arc_latitude_extremum(a, b) {
        min_lat = min_lat.min(extremum);
        max_lat = max_lat.max(extremum);
    }
    let (min_lon, max_lon) = if (a.lon - b.lon).abs() >= 180.0 {
        (-180.0, 180.0)
    } else {
        (a.lon.min(b.lon), a.lon.max(b.lon))
    };
    AABB::from_corners([min_lon, min_lat], [max_lon, max_lat])
}

/// Query boxes, as `[lon, lat]` corners, covering every point within
/// `tolerance_meters` of `point`. A box crossing the antimeridian is split in
/// two.
pub fn buffered_point_envelopes(point: LatLng, tolerance_meters: f64) -> Vec<AABB<[f64; 2]>> {
    let delta_lat = meters_to_degrees(tolerance_meters.max(0.0)) * ENVELOPE_SLACK
        + ENVELOPE_SLACK_DEGREES;
    let min_lat = (point.lat - delta_lat).max(-90.0);
    let max_lat = (point.lat + delta_lat).min(90.0);
    let poleward = min_lat.abs().max(max_lat.abs());
    let cosine = poleward.to_radians().cos();
    if cosine < MIN_LONGITUDE_COSINE || delta_lat / cosine >= 180.0 {
        return vec![AABB::from_corners([-180.0, min_lat], [180.0, max_lat])];
    }
    let delta_lon = delta_lat / cosine;
    let min_lon = point.lon - delta_lon;
    let max_lon = point.lon + delta_lon;

    let mut envelopes = vec![AABB::from_corners(
        [min_lon.max(-180.0), min_lat],
        [max_lon.min(180.0), max_lat],
    )];
    if min_lon < -180.0 {
        envelopes.push(AABB::from_corners([min_lon + 360.0, min_lat], [180.0, max_lat]));
    }
    if max_lon > 180.0 {
        envelopes.push(AABB::from_corners([-180.0, min_lat], [max_lon - 360.0, max_lat]));
    }
    envelopes
}

/// Cheap test whether `point` may lie within `tolerance_meters` of `path`.
///
/// Never returns false for a point that is within tolerance; it may return
/// true for points slightly outside, so an exact projection must follow.
pub fn buffered_corridor_contains(path: &[LatLng], tolerance_meters: f64, point: LatLng) -> bool {
    let envelopes = buffered_point_envelopes(point, tolerance_meters);
    if let [single] = path {
        let vertex = [single.lon, single.lat];
        return envelopes.iter().any(|envelope| envelope.contains_point(&vertex));
    }
    path.windows(2).any(|pair| {
        let segment = segment_envelope(pair[0], pair[1]);
        envelopes
            .iter()
            .any(|envelope| envelope.intersects(&segment))
    })
}

pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Equality up to a few ulps, used for producer-supplied distances.
pub(crate) fn near_by_fraction_or_margin(x: f64, y: f64) -> bool {
    if x.is_infinite() || y.is_infinite() {
        return false;
    }
    let margin = 1e-9 * 32.0;
    let relative_margin = margin * x.abs().max(y.abs());
    (x - y).abs() <= margin.max(relative_margin)
}

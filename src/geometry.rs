use crate::Coordinate;
use geo::{HaversineDistance, Point};
use itertools::Itertools;

/// Great-circle distance between two coordinates in meters.
pub fn distance_point_to_point(p: Coordinate, q: Coordinate) -> f64 {
    Point::new(p.lng, p.lat).haversine_distance(&Point::new(q.lng, q.lat))
}

/// Distance in meters from `p` to the segment `a`-`b`.
///
/// The closest-point search treats raw lat/lng as a local tangent plane:
/// t = clamp01(((p-a)·(b-a)) / |b-a|²) on degrees, then the projected point
/// is measured back to `p` with haversine. Good at city-block scale (tens of
/// meters); not valid at continental scale.
pub fn distance_point_to_segment(p: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let segment_length_sq = (b.lat - a.lat).powi(2) + (b.lng - a.lng).powi(2);
    if segment_length_sq == 0.0 {
        // degenerate segment, a == b
        return distance_point_to_point(p, a);
    }

    let t = (((p.lat - a.lat) * (b.lat - a.lat) + (p.lng - a.lng) * (b.lng - a.lng))
        / segment_length_sq)
        .clamp(0.0, 1.0);

    let projected = Coordinate {
        lat: a.lat + t * (b.lat - a.lat),
        lng: a.lng + t * (b.lng - a.lng),
    };

    distance_point_to_point(p, projected)
}

/// Minimum distance in meters from `p` to any segment of the polyline.
/// `None` when the polyline has fewer than 2 points and has no segments.
pub fn distance_point_to_polyline(p: Coordinate, coords: &[Coordinate]) -> Option<f64> {
    if coords.len() < 2 {
        return None;
    }

    Some(
        coords
            .iter()
            .tuple_windows()
            .map(|(a, b)| distance_point_to_segment(p, *a, *b))
            .fold(f64::INFINITY, f64::min),
    )
}

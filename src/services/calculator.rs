// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Distance, speed and elevation calculations over recorded segments.
//!
//! All functions expect each segment's samples in capture order and do not
//! re-sort. Pairs are only formed within a segment, never across a pause.

use crate::models::{Location, LocationTimestamp};
use geo::{Distance, Haversine, Point};

/// Great-circle distance between two locations (meters).
pub fn distance_meters(from: &Location, to: &Location) -> f64 {
    // geo points are (x = longitude, y = latitude)
    Haversine.distance(Point::new(from.long, from.lat), Point::new(to.long, to.lat))
}

/// Total distance across all segments (meters).
pub fn total_distance_meters(segments: &[Vec<LocationTimestamp>]) -> f64 {
    segments
        .iter()
        .flat_map(|segment| segment.windows(2))
        .map(|pair| distance_meters(&pair[0].location.location, &pair[1].location.location))
        .sum()
}

/// Fastest speed between any two consecutive samples (km/h).
///
/// Pairs with no elapsed time contribute 0.
pub fn max_speed_kmh(segments: &[Vec<LocationTimestamp>]) -> f64 {
    segments
        .iter()
        .flat_map(|segment| segment.windows(2))
        .map(|pair| {
            let elapsed = pair[1]
                .duration_timestamp
                .saturating_sub(pair[0].duration_timestamp);
            let hours = elapsed.as_secs_f64() / 3600.0;
            if hours == 0.0 {
                return 0.0;
            }
            let km =
                distance_meters(&pair[0].location.location, &pair[1].location.location) / 1000.0;
            km / hours
        })
        .fold(0.0, f64::max)
}

/// Sum of positive altitude changes (meters).
pub fn total_elevation_meters(segments: &[Vec<LocationTimestamp>]) -> f64 {
    segments
        .iter()
        .flat_map(|segment| segment.windows(2))
        .map(|pair| (pair[1].location.altitude - pair[0].location.altitude).max(0.0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationWithAltitude;
    use std::time::Duration;

    fn sample(lat: f64, long: f64, altitude: f64, secs: u64) -> LocationTimestamp {
        LocationTimestamp {
            location: LocationWithAltitude::new(lat, long, altitude),
            duration_timestamp: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(total_distance_meters(&[]), 0.0);
        assert_eq!(max_speed_kmh(&[]), 0.0);
        assert_eq!(total_elevation_meters(&[vec![]]), 0.0);
    }

    #[test]
    fn test_single_sample_has_no_distance() {
        let segments = vec![vec![sample(1.0, 1.0, 0.0, 0)]];
        assert_eq!(total_distance_meters(&segments), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let segments = vec![vec![sample(0.0, 0.0, 0.0, 0), sample(1.0, 0.0, 0.0, 60)]];
        let d = total_distance_meters(&segments);
        // ~111.2 km per degree on a 6371 km sphere
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn test_no_distance_across_segment_boundary() {
        let segments = vec![
            vec![sample(0.0, 0.0, 0.0, 0)],
            vec![sample(1.0, 0.0, 0.0, 60)],
        ];
        assert_eq!(total_distance_meters(&segments), 0.0);
    }

    #[test]
    fn test_zero_elapsed_pair_contributes_zero() {
        let segments = vec![vec![sample(0.0, 0.0, 0.0, 10), sample(0.001, 0.0, 0.0, 10)]];
        let speed = max_speed_kmh(&segments);
        assert_eq!(speed, 0.0);
        assert!(speed.is_finite());
    }

    #[test]
    fn test_max_speed_takes_fastest_pair() {
        // ~111 m in 60 s (6.7 km/h), then ~111 m in 20 s (20 km/h)
        let segments = vec![vec![
            sample(0.0, 0.0, 0.0, 0),
            sample(0.001, 0.0, 0.0, 60),
            sample(0.002, 0.0, 0.0, 80),
        ]];
        let speed = max_speed_kmh(&segments);
        assert!((speed - 20.0).abs() < 0.1, "got {}", speed);
    }

    #[test]
    fn test_elevation_only_counts_gains() {
        let segments = vec![vec![
            sample(0.0, 0.0, 10.0, 0),
            sample(0.0, 0.0, 15.0, 1),
            sample(0.0, 0.0, 12.0, 2),
            sample(0.0, 0.0, 20.0, 3),
        ]];
        assert_eq!(total_elevation_meters(&segments), 13.0);
    }

    #[test]
    fn test_descending_elevation_is_zero() {
        let segments = vec![vec![
            sample(0.0, 0.0, 30.0, 0),
            sample(0.0, 0.0, 20.0, 1),
            sample(0.0, 0.0, 10.0, 2),
        ]];
        assert_eq!(total_elevation_meters(&segments), 0.0);
    }
}

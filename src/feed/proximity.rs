//! Radius filtering and distance ordering of reports.

use std::cmp::Ordering;

use serde::Serialize;

use crate::{
    db::Report,
    geo::{distance_km, Coordinate},
};

/// Staff see reports within this many kilometers of their position.
pub const NEARBY_RADIUS_KM: f64 = 5.0;

/// A report together with its distance from the current observer. The distance
/// is view state and is never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedReport {
    #[serde(flatten)]
    pub report: Report,
    pub distance_km: f64,
}

impl AnnotatedReport {
    pub fn measured_from(report: Report, origin: Coordinate) -> Self {
        let distance_km = distance_km(origin, report.coordinate());
        Self {
            report,
            distance_km,
        }
    }

    pub fn id(&self) -> &str {
        &self.report.id
    }
}

/// Reports within `radius_km` of `origin`, annotated with their distance.
///
/// The output keeps input order. The comparison is an exact `<=`, so a radius of
/// zero only admits reports sitting exactly on the origin.
pub fn filter_within_radius(
    reports: &[Report],
    origin: Coordinate,
    radius_km: f64,
) -> Vec<AnnotatedReport> {
    reports
        .iter()
        .map(|report| AnnotatedReport::measured_from(report.clone(), origin))
        .filter(|annotated| annotated.distance_km <= radius_km)
        .collect()
}

/// Ascending by distance. Stable: equal distances keep their input order.
pub fn sort_by_distance(mut reports: Vec<AnnotatedReport>) -> Vec<AnnotatedReport> {
    reports.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    reports
}

/// Position at which an entry `distance_km` away keeps `sorted` ordered. Lands
/// after any entries at the same distance.
pub fn insertion_index(sorted: &[AnnotatedReport], distance_km: f64) -> usize {
    sorted.partition_point(|entry| entry.distance_km.total_cmp(&distance_km) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::ReportStatus, geo::EARTH_RADIUS_KM};
    use chrono::Utc;

    const ORIGIN: Coordinate = Coordinate::new(40.88, 29.20);

    fn km_north(km: f64) -> f64 {
        ORIGIN.latitude + km / (EARTH_RADIUS_KM * std::f64::consts::PI / 180.0)
    }

    fn report(id: &str, latitude: f64, longitude: f64) -> Report {
        Report {
            id: id.into(),
            reporter_id: None,
            latitude,
            longitude,
            location_name: id.into(),
            description: String::new(),
            image_url: None,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn annotated(id: &str, distance_km: f64) -> AnnotatedReport {
        AnnotatedReport {
            report: report(id, 0.0, 0.0),
            distance_km,
        }
    }

    fn ids(entries: &[AnnotatedReport]) -> Vec<&str> {
        entries.iter().map(AnnotatedReport::id).collect()
    }

    #[test]
    fn keeps_only_reports_inside_the_radius_sorted() {
        // Fetch order is most-recent-first, so distances arrive shuffled.
        let reports = vec![
            report("d6.0", km_north(6.0), ORIGIN.longitude),
            report("d0.5", km_north(0.5), ORIGIN.longitude),
            report("d10", km_north(10.0), ORIGIN.longitude),
            report("d4.9", km_north(4.9), ORIGIN.longitude),
            report("d3.0", km_north(3.0), ORIGIN.longitude),
        ];

        let nearby = sort_by_distance(filter_within_radius(&reports, ORIGIN, NEARBY_RADIUS_KM));

        assert_eq!(ids(&nearby), vec!["d0.5", "d3.0", "d4.9"]);
        for (entry, expected) in nearby.iter().zip([0.5, 3.0, 4.9]) {
            assert!((entry.distance_km - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn filter_is_a_subsequence_within_the_radius() {
        let reports: Vec<_> = (0..20)
            .map(|i| report(&format!("r{i}"), km_north(i as f64 * 0.7), ORIGIN.longitude))
            .collect();

        for radius in [0.0, 1.0, 2.5, 7.0, 100.0] {
            let kept = filter_within_radius(&reports, ORIGIN, radius);
            assert!(kept.iter().all(|entry| entry.distance_km <= radius));

            let mut cursor = reports.iter();
            for entry in &kept {
                assert!(cursor.any(|r| r.id == entry.report.id), "order not preserved");
            }
        }
    }

    #[test]
    fn zero_radius_admits_only_exact_matches() {
        let reports = vec![
            report("here", ORIGIN.latitude, ORIGIN.longitude),
            report("close", ORIGIN.latitude + 1e-9, ORIGIN.longitude),
        ];

        let kept = filter_within_radius(&reports, ORIGIN, 0.0);
        assert_eq!(ids(&kept), vec!["here"]);
        assert_eq!(kept[0].distance_km, 0.0);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(filter_within_radius(&[], ORIGIN, NEARBY_RADIUS_KM).is_empty());
        assert!(sort_by_distance(Vec::new()).is_empty());
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let sorted = sort_by_distance(vec![
            annotated("a", 2.0),
            annotated("b", 1.0),
            annotated("c", 2.0),
            annotated("d", 1.0),
        ]);

        assert_eq!(ids(&sorted), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn sort_is_idempotent() {
        let once = sort_by_distance(vec![
            annotated("a", 3.0),
            annotated("b", 0.0),
            annotated("c", 3.0),
            annotated("d", 1.5),
        ]);
        let twice = sort_by_distance(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn insertion_goes_after_existing_ties() {
        let sorted = vec![annotated("a", 1.0), annotated("b", 2.0), annotated("c", 2.0)];

        assert_eq!(insertion_index(&sorted, 0.5), 0);
        assert_eq!(insertion_index(&sorted, 1.0), 1);
        assert_eq!(insertion_index(&sorted, 2.0), 3);
        assert_eq!(insertion_index(&sorted, 9.0), 3);
        assert_eq!(insertion_index(&[], 1.0), 0);
    }
}

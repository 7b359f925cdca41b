//! Property-based tests fuzzing small POI/combo-group configurations
//! against invariants 1 (exactly-once), 2 (no-gap positions), 4 (combo
//! togetherness) and 9 (score bounds) from spec §8, in the style of the
//! `leynos-wildside-engine` reference example's `proptest` suite for its
//! own VRP solver invariants (`other_examples/
//! 642fec7b_leynos-wildside-engine__wildside-solver-vrp-tests-property_tests.rs.rs`).
//!
//! Every generated POI is open all week, all day, so the CP model never
//! has to reject a configuration purely on time-window grounds — these
//! tests are about the combinatorial/scoring invariants, not feasibility,
//! which the seed scenarios (`seed_scenarios.rs`) already cover directly.

mod fixtures;

use std::collections::HashSet;

use proptest::collection::vec as pvec;
use proptest::prelude::*;

use tour_planner::coherence::CoherenceMatrix;
use tour_planner::combo::{ComboConstraints, ComboGroup, TicketType, VisitOrder};
use tour_planner::config::{Pace, PlannerConfig};
use tour_planner::distance::Matrix;
use tour_planner::poi::Poi;
use tour_planner::sequencer::{self, SequencerInput};

use fixtures::open_all_week;

fn fuzz_poi(index: usize, dlat: f64, dlng: f64) -> Poi {
    Poi {
        slug: format!("poi-{index}"),
        name: format!("POI {index}"),
        city: "testville".to_string(),
        location: Some(tour_planner::poi::GeoPoint {
            latitude: 41.9 + dlat,
            longitude: 12.49 + dlng,
            source: tour_planner::poi::CoordinateSource::Manual,
            collected_at: 0,
        }),
        estimated_visit_minutes: 120,
        opening_hours: open_all_week(),
        ..Default::default()
    }
}

/// 3..=6 always-open POIs, optionally with a `must_visit_together` combo
/// group over a random subset of at least 2 of them.
fn scenario_strategy() -> impl Strategy<Value = (Vec<Poi>, Option<ComboGroup>, usize)> {
    (3usize..=6).prop_flat_map(|n| {
        (pvec(0.0f64..1.0, n), pvec(0.0f64..1.0, n), proptest::option::of(2usize..=n.min(4)), 1usize..=3).prop_map(
            move |(lat_jit, lng_jit, combo_size, day_count)| {
                let pois: Vec<Poi> = (0..n).map(|i| fuzz_poi(i, lat_jit[i] * 0.05, lng_jit[i] * 0.05)).collect();

                let group = combo_size.map(|size| {
                    let members: Vec<String> = pois.iter().take(size).map(|p| p.name.clone()).collect();
                    ComboGroup {
                        id: "fuzz_combo".to_string(),
                        city: "testville".to_string(),
                        members,
                        constraints: ComboConstraints {
                            must_visit_together: true,
                            max_separation_hours: 4.0,
                            visit_order: VisitOrder::Flexible,
                            same_day_required: true,
                            ticket_type: TicketType::SameDayAnyOrder,
                        },
                    }
                });

                (pois, group, day_count)
            },
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Invariants 1, 2, 4 and 9 together: every solved (or greedy-fallback)
    /// itinerary assigns each POI exactly once, every day's POI list has no
    /// internal gaps (trivial for a `Vec`, but its *length* must sum to N —
    /// the real content of invariant 2 once positions are already
    /// compacted into day lists), any `must_visit_together` combo group's
    /// selected members land on one shared day, and every score lies in
    /// [0, 1].
    #[test]
    fn solved_itinerary_respects_core_invariants((pois, combo, day_count) in scenario_strategy()) {
        let refs: Vec<&Poi> = pois.iter().collect();
        let coherence = CoherenceMatrix::build(&refs);
        let distances = Matrix::default();
        let config = PlannerConfig::default();
        let combo_groups: Vec<&ComboGroup> = combo.iter().collect();

        let input = SequencerInput {
            pois: refs.clone(),
            must_see: vec![],
            combo_groups: combo_groups.clone(),
            distances: &distances,
            coherence: &coherence,
            day_count,
            trip_start_weekday: 1,
            start_location: None,
            end_location: None,
            pace: Pace::Normal,
        };

        let Ok(output) = sequencer::solve(input, &config) else {
            // An all-open-all-week configuration with only a SameDay
            // combo constraint is always feasible; a solver error here
            // would itself be the bug. Fail loudly rather than skip.
            prop_assert!(false, "expected a feasible solution for an always-open POI set");
            return Ok(());
        };

        // Invariant 1: exactly-once.
        prop_assert_eq!(output.sequence.len(), pois.len());
        let unique: HashSet<&str> = output.sequence.iter().map(|s| s.as_str()).collect();
        prop_assert_eq!(unique.len(), pois.len());

        // Invariant 2: positions within each day are a dense prefix, i.e.
        // the day lists partition the sequence with no POI omitted or
        // duplicated across days.
        let total_in_days: usize = output.day_assignments.iter().map(|d| d.len()).sum();
        prop_assert_eq!(total_in_days, pois.len());
        let from_days: HashSet<&str> = output.day_assignments.iter().flatten().map(|s| s.as_str()).collect();
        prop_assert_eq!(from_days.len(), pois.len());

        // Invariant 4: combo togetherness.
        if let Some(group) = &combo {
            let slug_by_name: std::collections::HashMap<&str, &str> =
                pois.iter().map(|p| (p.name.as_str(), p.slug.as_str())).collect();
            let member_slugs: Vec<&str> = group.members.iter().filter_map(|m| slug_by_name.get(m.as_str()).copied()).collect();
            let days_used: HashSet<usize> = output
                .day_assignments
                .iter()
                .enumerate()
                .filter(|(_, day)| day.iter().any(|s| member_slugs.contains(&s.as_str())))
                .map(|(idx, _)| idx)
                .collect();
            prop_assert!(days_used.len() <= 1, "must_visit_together members landed on {} different days", days_used.len());
        }

        // Invariant 9: score bounds.
        prop_assert!((0.0..=1.0).contains(&output.scores.distance_score));
        prop_assert!((0.0..=1.0).contains(&output.scores.coherence_score));
        prop_assert!((0.0..=1.0).contains(&output.scores.overall_score));
    }

    /// Invariant 7 (distance-cache idempotence), restated as a property:
    /// extending the cache with an empty new-POI set is always a no-op on
    /// pair count, for any existing matrix built from a random small POI
    /// set.
    #[test]
    fn extend_with_no_new_pois_is_a_no_op(pois in pvec((-1.0f64..1.0, -1.0f64..1.0), 2..6)) {
        use tour_planner::geo_provider::StaticGeoProvider;

        let built: Vec<Poi> = pois.into_iter().enumerate().map(|(i, (dlat, dlng))| fuzz_poi(i, dlat * 0.01, dlng * 0.01)).collect();
        let refs: Vec<&Poi> = built.iter().collect();
        let provider = StaticGeoProvider::new(4.0);
        let config = PlannerConfig::default();

        let matrix = tour_planner::distance::compute_all(&refs, &provider, &config).unwrap();
        let before = matrix.pair_count();
        let extended = tour_planner::distance::extend(&[], &refs, &provider, &matrix, &config).unwrap();
        prop_assert_eq!(extended.pair_count(), before);
    }
}

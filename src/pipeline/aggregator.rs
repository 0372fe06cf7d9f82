//! Aggregation of partial results into the running estimate table.
//!
//! Rows are appended in arrival order: outcomes in the order the dispatcher
//! returned them, partials in the order each worker reported them.
//! Cumulative columns only depend on the multiset of partials, so merging
//! round by round and merging everything at once give the same totals.

use crate::models::{AggregateRow, RoundOutcome};

/// Append the partials of `outcomes` after `previous`.
pub fn aggregate(previous: Vec<AggregateRow>, outcomes: &[RoundOutcome]) -> Vec<AggregateRow> {
    let mut rows = previous;
    let (mut cumulative_in_circle, mut cumulative_shots) = rows
        .last()
        .map(|r| (r.cumulative_in_circle, r.cumulative_shots))
        .unwrap_or((0, 0));

    let added: usize = outcomes.iter().map(|o| o.partials.len()).sum();
    rows.reserve(added);

    for partial in outcomes.iter().flat_map(|o| o.partials.iter()) {
        cumulative_in_circle += partial.in_circle;
        cumulative_shots += partial.shots;

        rows.push(AggregateRow {
            sequence_number: rows.len() + 1,
            work_unit_id: partial.work_unit_id.clone(),
            in_circle: partial.in_circle,
            shots: partial.shots,
            cumulative_in_circle,
            cumulative_shots,
            running_pi_estimate: pi_estimate(cumulative_in_circle, cumulative_shots),
        });
    }

    rows
}

/// 4 * in_circle / shots, or 0 when nothing was sampled.
pub fn pi_estimate(in_circle: u64, shots: u64) -> f64 {
    if shots == 0 {
        return 0.0;
    }
    in_circle as f64 / shots as f64 * 4.0
}

/// Total shots across `rows`.
pub fn total_shots(rows: &[AggregateRow]) -> u64 {
    rows.last().map_or(0, |r| r.cumulative_shots)
}

/// Total points inside the circle across `rows`.
pub fn total_in_circle(rows: &[AggregateRow]) -> u64 {
    rows.last().map_or(0, |r| r.cumulative_in_circle)
}

/// Running estimate of the last row, if any.
pub fn running_estimate(rows: &[AggregateRow]) -> Option<f64> {
    rows.last().map(|r| r.running_pi_estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartialResult;

    fn outcome(id: &str, counts: &[(u64, u64)]) -> RoundOutcome {
        RoundOutcome {
            work_unit_id: id.to_string(),
            partials: counts
                .iter()
                .map(|&(in_circle, shots)| PartialResult {
                    work_unit_id: id.to_string(),
                    in_circle,
                    shots,
                })
                .collect(),
            elapsed_secs: 0.1,
        }
    }

    #[test]
    fn test_two_workers_one_interval_each() {
        let rows = aggregate(
            Vec::new(),
            &[outcome("a", &[(790, 1_000)]), outcome("b", &[(780, 1_000)])],
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sequence_number, 1);
        assert_eq!(rows[1].sequence_number, 2);
        assert_eq!(rows[1].work_unit_id, "b");
        assert_eq!(total_shots(&rows), 2_000);
        assert_eq!(total_in_circle(&rows), 1_570);
        assert_eq!(running_estimate(&rows), Some(1_570.0 / 2_000.0 * 4.0));
    }

    #[test]
    fn test_incremental_matches_single_pass() {
        let round_1 = [outcome("a", &[(790, 1_000), (781, 1_000)]), outcome("b", &[(770, 1_000)])];
        let round_2 = [outcome("c", &[(800, 1_000)]), outcome("d", &[(760, 1_000), (799, 1_000)])];

        let incremental = aggregate(aggregate(Vec::new(), &round_1), &round_2);

        let all: Vec<RoundOutcome> = round_1.iter().chain(round_2.iter()).cloned().collect();
        let single = aggregate(Vec::new(), &all);

        assert_eq!(incremental, single);
        assert_eq!(total_shots(&incremental), 6_000);

        // order of arrival does not change the totals
        let reversed: Vec<RoundOutcome> = all.iter().rev().cloned().collect();
        let other = aggregate(Vec::new(), &reversed);
        assert_eq!(total_shots(&other), total_shots(&single));
        assert_eq!(total_in_circle(&other), total_in_circle(&single));
        assert_eq!(running_estimate(&other), running_estimate(&single));
    }

    #[test]
    fn test_row_invariants() {
        let rows = aggregate(
            Vec::new(),
            &[
                outcome("a", &[(0, 1_000), (1_000, 1_000)]),
                outcome("b", &[(500, 1_000), (1_000, 1_000)]),
            ],
        );

        let mut prev = (0, 0);
        for row in &rows {
            assert!(row.cumulative_in_circle <= row.cumulative_shots);
            assert!((0.0..=4.0).contains(&row.running_pi_estimate));
            assert!(row.cumulative_in_circle >= prev.0 && row.cumulative_shots >= prev.1);
            assert_eq!(
                row.running_pi_estimate,
                row.cumulative_in_circle as f64 / row.cumulative_shots as f64 * 4.0
            );
            prev = (row.cumulative_in_circle, row.cumulative_shots);
        }
        assert_eq!(rows[0].running_pi_estimate, 0.0);
    }

    #[test]
    fn test_empty_inputs() {
        let rows = aggregate(Vec::new(), &[]);
        assert!(rows.is_empty());
        assert_eq!(total_shots(&rows), 0);
        assert_eq!(running_estimate(&rows), None);
        assert_eq!(pi_estimate(0, 0), 0.0);
    }
}

//! Monte Carlo sampler.
//!
//! Draws uniform points in [-1, 1) x [-1, 1) and counts the ones strictly
//! inside the unit circle, one partial per complete report interval.

use rand::Rng;

use crate::models::PartialResult;

/// Sample `subshot_count` points and report every `report_interval` points.
///
/// A trailing incomplete interval is drawn but not reported, so the result
/// is empty when `subshot_count < report_interval` (or the interval is 0).
pub fn sample<R: Rng + ?Sized>(
    rng: &mut R,
    subshot_count: u64,
    report_interval: u64,
    work_unit_id: &str,
) -> Vec<PartialResult> {
    let capacity = subshot_count.checked_div(report_interval).unwrap_or(0) as usize;
    let mut partials = Vec::with_capacity(capacity);
    let mut in_circle = 0u64;
    let mut since_report = 0u64;

    for _ in 0..subshot_count {
        let x: f64 = rng.gen_range(-1.0..1.0);
        let y: f64 = rng.gen_range(-1.0..1.0);
        if x * x + y * y < 1.0 {
            in_circle += 1;
        }

        since_report += 1;
        if since_report == report_interval {
            partials.push(PartialResult {
                work_unit_id: work_unit_id.to_string(),
                in_circle,
                shots: report_interval,
            });
            in_circle = 0;
            since_report = 0;
        }
    }

    partials
}

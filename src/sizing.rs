//! The Sizing Calculator: a pure function from an original size and an
//! effective policy to a target size. No suspension points, no cluster
//! calls — grounded in the teacher's own pure-calculation module,
//! `controllers::podautoscaler::replica_calculator`, generalized from
//! "current utilization vs. target" to "original size times percentage".

/// `round(x)` to the nearest integer, ties away from zero.
fn round_half_away_from_zero(x: f64) -> f64 {
    if x >= 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

/// `round_half_away_from_zero(original * percentage / 100)`, computed with a
/// 64-bit intermediate product and saturated back to `i32` so extreme
/// percentages clamp instead of wrapping around.
fn scale(original: i32, percentage: i32) -> i32 {
    let product = original as i64 * percentage as i64;
    let rounded = round_half_away_from_zero(product as f64 / 100.0);
    if rounded >= i32::MAX as f64 {
        i32::MAX
    } else if rounded <= i32::MIN as f64 {
        i32::MIN
    } else {
        rounded as i32
    }
}

/// Compute the target replica count for a Deployment.
///
/// `original` is expected to be a positive replica count; `percentage` is
/// non-negative; `min <= max` is the effective resolved bound. Always
/// returns a value in `[max(1, min), max]`.
pub fn calculate_target(original: i32, percentage: i32, min: i32, max: i32) -> i32 {
    let mut raw = scale(original, percentage);
    raw = raw.max(1);
    raw = raw.max(min);
    raw = raw.min(max);
    raw
}

/// Compute `(newMin, newMax)` for an HPA: the same scaling rule applied to
/// the original min and max independently, then `newMin <- max(1, newMin)`
/// and `newMax <- max(newMin, newMax)`.
pub fn calculate_hpa_bounds(original_min: i32, original_max: i32, percentage: i32) -> (i32, i32) {
    let new_min = scale(original_min, percentage).max(1);
    let new_max = scale(original_max, percentage).max(new_min);
    (new_min, new_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_up_by_percentage() {
        assert_eq!(calculate_target(4, 150, 1, 100), 6);
    }

    #[test]
    fn scales_down_by_percentage() {
        assert_eq!(calculate_target(4, 50, 1, 100), 2);
    }

    #[test]
    fn clamps_to_max_when_percentage_overshoots() {
        assert_eq!(calculate_target(4, 200, 1, 8), 8);
    }

    #[test]
    fn rounds_to_zero_then_clamps_to_min() {
        // round(4 * 10 / 100) = round(0.4) = 0 -> max(1,0)=1 -> max(3,1)=3
        assert_eq!(calculate_target(4, 10, 3, 5), 3);
    }

    #[test]
    fn computes_hpa_bounds_from_percentage() {
        assert_eq!(calculate_hpa_bounds(2, 10, 150), (3, 15));
    }

    #[test]
    fn sizing_totality_stays_within_bounds() {
        for original in [1, 2, 5, 1000, i32::MAX] {
            for percentage in [0, 1, 50, 100, 150, 1000] {
                for (min, max) in [(1, 1), (1, 100), (5, 5), (1, i32::MAX)] {
                    let target = calculate_target(original, percentage, min, max);
                    assert!(target >= min.max(1), "{target} < {min}");
                    assert!(target <= max, "{target} > {max}");
                }
            }
        }
    }

    #[test]
    fn round_half_away_from_zero_ties_correctly() {
        assert_eq!(round_half_away_from_zero(0.5), 1.0);
        assert_eq!(round_half_away_from_zero(-0.5), -1.0);
        assert_eq!(round_half_away_from_zero(2.4), 2.0);
        assert_eq!(round_half_away_from_zero(2.6), 3.0);
    }

    #[test]
    fn scale_saturates_instead_of_overflowing() {
        // Without a 64-bit intermediate this would overflow i32.
        assert_eq!(scale(i32::MAX, 1000), i32::MAX);
    }

    #[test]
    fn hpa_bounds_never_invert() {
        let (new_min, new_max) = calculate_hpa_bounds(10, 10, 0);
        assert_eq!(new_min, 1);
        assert!(new_max >= new_min);
    }
}

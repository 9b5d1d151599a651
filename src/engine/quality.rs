//! Maps a continuous answer score into the 0..=5 SM-2 quality grade.

/// Time ratios above this (actual / expected) cost one quality point.
pub const SLOW_ANSWER_RATIO: f64 = 2.0;

/// Convert a score in [0, 1] plus modifiers into an SM-2 quality grade.
/// Hint usage and a slow answer each subtract one point, floored at zero.
pub fn map_quality(score: f64, hint_used: bool, time_ratio: Option<f64>) -> u8 {
    let base: i8 = if score >= 0.95 {
        5
    } else if score >= 0.85 {
        4
    } else if score >= 0.70 {
        3
    } else if score >= 0.50 {
        2
    } else if score >= 0.20 {
        1
    } else {
        0
    };

    let mut quality = base;
    if hint_used {
        quality -= 1;
    }
    if time_ratio.is_some_and(|r| r > SLOW_ANSWER_RATIO) {
        quality -= 1;
    }

    quality.max(0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bands() {
        assert_eq!(map_quality(1.0, false, None), 5);
        assert_eq!(map_quality(0.95, false, None), 5);
        assert_eq!(map_quality(0.90, false, None), 4);
        assert_eq!(map_quality(0.70, false, None), 3);
        assert_eq!(map_quality(0.69, false, None), 2);
        assert_eq!(map_quality(0.20, false, None), 1);
        assert_eq!(map_quality(0.19, false, None), 0);
    }

    #[test]
    fn hint_costs_a_point() {
        assert_eq!(map_quality(0.90, true, None), 3);
    }

    #[test]
    fn slow_answer_costs_a_point() {
        assert_eq!(map_quality(0.95, false, Some(2.5)), 4);
        assert_eq!(map_quality(0.95, false, Some(2.0)), 5); // exactly 2x is fine
    }

    #[test]
    fn adjustments_never_go_below_zero() {
        assert_eq!(map_quality(0.50, true, Some(3.0)), 0);
        assert_eq!(map_quality(0.10, true, Some(3.0)), 0);
    }
}

//! Property tests for the pure scheduling arithmetic: SM-2 bounds, failure
//! resets, determinism, and the quality mapper's range.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use examina_engine::engine::quality::map_quality;
use examina_engine::engine::sm2::{schedule, Sm2State, MAX_EASINESS, MIN_EASINESS};

/// States reachable by the scheduler itself: a zero interval only occurs
/// before the first successful repetition.
fn any_state() -> impl Strategy<Value = Sm2State> {
    (
        MIN_EASINESS..=MAX_EASINESS,
        0i64..100,
        0i64..10_000,
    )
        .prop_map(|(easiness_factor, repetition_number, interval_days)| Sm2State {
            easiness_factor,
            repetition_number,
            interval_days: if repetition_number == 0 {
                interval_days.min(1)
            } else {
                interval_days.max(1)
            },
        })
}

proptest! {
    #[test]
    fn easiness_stays_clamped(quality in 0u8..=10, state in any_state()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let out = schedule(quality, state, now);
        prop_assert!(out.state.easiness_factor >= MIN_EASINESS);
        prop_assert!(out.state.easiness_factor <= MAX_EASINESS);
    }

    #[test]
    fn failure_always_resets(quality in 0u8..3, state in any_state()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let out = schedule(quality, state, now);
        prop_assert_eq!(out.state.repetition_number, 0);
        prop_assert_eq!(out.state.interval_days, 1);
        // EF untouched on failure (modulo the clamp, which the input obeys)
        prop_assert_eq!(out.state.easiness_factor, state.easiness_factor);
    }

    #[test]
    fn success_increments_repetitions(quality in 3u8..=5, state in any_state()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let out = schedule(quality, state, now);
        prop_assert_eq!(out.state.repetition_number, state.repetition_number + 1);
        prop_assert!(out.state.interval_days >= 1);
    }

    #[test]
    fn schedule_is_deterministic(quality in 0u8..=5, state in any_state()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let a = schedule(quality, state, now);
        let b = schedule(quality, state, now);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn due_date_matches_interval(quality in 0u8..=5, state in any_state()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let out = schedule(quality, state, now);
        prop_assert_eq!(out.due, now + chrono::Duration::days(out.state.interval_days));
    }

    #[test]
    fn quality_always_in_grade_range(
        score in 0.0f64..=1.0,
        hint_used in any::<bool>(),
        time_ratio in proptest::option::of(0.0f64..10.0),
    ) {
        let quality = map_quality(score, hint_used, time_ratio);
        prop_assert!(quality <= 5);
    }

    #[test]
    fn quality_is_monotone_in_score(
        low in 0.0f64..=1.0,
        high in 0.0f64..=1.0,
        hint_used in any::<bool>(),
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        prop_assert!(map_quality(low, hint_used, None) <= map_quality(high, hint_used, None));
    }

    #[test]
    fn penalties_never_raise_quality(score in 0.0f64..=1.0) {
        let clean = map_quality(score, false, None);
        prop_assert!(map_quality(score, true, None) <= clean);
        prop_assert!(map_quality(score, false, Some(3.0)) <= clean);
        prop_assert!(map_quality(score, true, Some(3.0)) <= clean);
    }
}

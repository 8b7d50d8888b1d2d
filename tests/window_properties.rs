//! Property tests for the sliding window counter.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use zentinel_security_monitor::{SlidingWindowCounter, WindowedKey};

const WINDOW_SECS: i64 = 60;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

proptest! {
    /// With records at non-decreasing offsets, the count at any later
    /// instant equals the records inside the trailing window.
    #[test]
    fn count_matches_trailing_window(
        mut offsets in prop::collection::vec(0i64..600, 0..64),
        probe in 0i64..700,
    ) {
        offsets.sort_unstable();
        let counter = SlidingWindowCounter::new(Duration::seconds(WINDOW_SECS));
        let key = WindowedKey::new("subject", "resource");

        for offset in &offsets {
            counter.record(&key, t0() + Duration::seconds(*offset));
        }

        let last = offsets.last().copied().unwrap_or(0);
        let at = last.max(probe);
        let expected = offsets.iter().filter(|&&o| at - o < WINDOW_SECS).count();
        prop_assert_eq!(counter.count(&key, t0() + Duration::seconds(at)), expected);
    }

    /// Without further records the count never grows as time advances.
    #[test]
    fn count_is_non_increasing(
        mut offsets in prop::collection::vec(0i64..120, 1..32),
        mut probes in prop::collection::vec(0i64..300, 1..16),
    ) {
        offsets.sort_unstable();
        probes.sort_unstable();
        let counter = SlidingWindowCounter::new(Duration::seconds(WINDOW_SECS));
        let key = WindowedKey::new("subject", "resource");

        for offset in &offsets {
            counter.record(&key, t0() + Duration::seconds(*offset));
        }

        let start = *offsets.last().unwrap();
        let mut previous = usize::MAX;
        for probe in probes {
            let count = counter.count(&key, t0() + Duration::seconds(start + probe));
            prop_assert!(count <= previous);
            previous = count;
        }
    }

    /// A stale clock never resurrects pruned hits.
    #[test]
    fn backward_time_is_clamped(
        forward in 61i64..1_000,
        back in 0i64..1_000,
    ) {
        let counter = SlidingWindowCounter::new(Duration::seconds(WINDOW_SECS));
        let key = WindowedKey::new("subject", "resource");

        counter.record(&key, t0());
        counter.record(&key, t0() + Duration::seconds(forward));
        let seen = counter.count(&key, t0() + Duration::seconds(forward));
        prop_assert_eq!(seen, 1);
        prop_assert_eq!(counter.count(&key, t0() + Duration::seconds(forward - back)), seen);
    }
}

//! Property tests for the downtime duration codec.

use flare::duration::{format, parse};
use proptest::prelude::*;

proptest! {
    #[test]
    fn format_then_parse_returns_seconds(seconds in any::<u64>()) {
        let text = format(seconds);
        prop_assert_eq!(parse(&text).unwrap(), seconds);
    }

    #[test]
    fn parse_accepts_any_unit_combination(
        hours in 0u64..100_000,
        minutes in 0u64..1000,
        secs in 0u64..1000,
    ) {
        let text = format!("{hours}h {minutes}m {secs}s");
        let expected = hours * 3_600 + minutes * 60 + secs;
        prop_assert_eq!(parse(&text).unwrap(), expected);
    }

    #[test]
    fn repeated_unit_is_rejected(a in 0u64..1000, b in 0u64..1000, unit in "[hms]") {
        let text = format!("{a}{unit} {b}{unit}");
        prop_assert!(parse(&text).is_err());
    }

    #[test]
    fn parse_never_panics(input in "\\PC{0,24}") {
        let _ = parse(&input);
    }
}

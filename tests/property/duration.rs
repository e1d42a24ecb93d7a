use phishcheck::config::parse_duration;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn shorthand_units(
        n in 0u64..=999_999,
        unit in prop::sample::select(vec![('s', 1u64), ('m', 60), ('h', 3_600), ('d', 86_400)]),
    ) {
        let input = format!("{}{}", n, unit.0);
        prop_assert_eq!(parse_duration(&input), Ok(Duration::from_secs(n * unit.1)));
    }

    #[test]
    fn iso_equals_shorthand(h in 0u64..=9_999, m in 0u64..=59, s in 0u64..=59) {
        let iso = parse_duration(&format!("PT{}H{}M{}S", h, m, s)).unwrap();
        let total = parse_duration(&format!("{}s", h * 3_600 + m * 60 + s)).unwrap();
        prop_assert_eq!(iso, total);
    }

    #[test]
    fn iso_days_and_time(d in 0u64..=3_650, h in 0u64..=23) {
        let parsed = parse_duration(&format!("P{}DT{}H", d, h)).unwrap();
        prop_assert_eq!(parsed, Duration::from_secs(d * 86_400 + h * 3_600));
    }

    // Garbage never panics.
    #[test]
    fn arbitrary_input_does_not_panic(input in "\\PC{0,20}") {
        let _ = parse_duration(&input);
    }
}

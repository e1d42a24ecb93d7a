use phishcheck::{Band, DetectionThresholds, Overrides, classify};
use proptest::prelude::*;

fn rank(band: Band) -> u8 {
    match band {
        Band::Phishing => 0,
        Band::Suspicious => 1,
        Band::Legitimate => 2,
    }
}

/// Ordered thresholds `phishing < suspicious < legitimate` within 0..=100.
fn thresholds() -> impl Strategy<Value = DetectionThresholds> {
    (0i64..=98)
        .prop_flat_map(|p| (Just(p), (p + 1)..=99))
        .prop_flat_map(|(p, s)| (Just(p), Just(s), (s + 1)..=100))
        .prop_map(|(phishing, suspicious, legitimate)| DetectionThresholds {
            legitimate,
            suspicious,
            phishing,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Without overrides the band is fixed by the two upper thresholds.
    #[test]
    fn band_follows_thresholds(t in thresholds(), score in 0.0f64..=100.0) {
        let band = classify(score, &Overrides::default(), &t);
        let expected = if score >= t.legitimate as f64 {
            Band::Legitimate
        } else if score >= t.suspicious as f64 {
            Band::Suspicious
        } else {
            Band::Phishing
        };
        prop_assert_eq!(band, expected);
    }

    // A higher score never lands in a worse band.
    #[test]
    fn band_is_monotonic_in_score(t in thresholds(), a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let none = Overrides::default();
        prop_assert!(rank(classify(lo, &none, &t)) <= rank(classify(hi, &none, &t)));
    }

    // Overrides ignore the score entirely.
    #[test]
    fn overrides_ignore_score(t in thresholds(), score in 0.0f64..=100.0, allow in any::<bool>()) {
        let critical = Overrides { critical_block: true, allow };
        prop_assert_eq!(classify(score, &critical, &t), Band::Phishing);
        let allowed = Overrides { critical_block: false, allow: true };
        prop_assert_eq!(classify(score, &allowed, &t), Band::Legitimate);
    }
}

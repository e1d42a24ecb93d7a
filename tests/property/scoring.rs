use crate::common::*;
use phishcheck::Band;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // Adding one more matching indicator with a non-negative weight never
    // lowers the score.
    #[test]
    fn positive_indicator_is_monotonic(
        weights in prop::collection::vec(-60.0f64..60.0, 0..8),
        extra in 0.0f64..60.0,
    ) {
        let base = load_value(&weighted_doc(&weights));
        let mut more = weights.clone();
        more.push(extra);
        let extended = load_value(&weighted_doc(&more));

        let page = login_page(more.len());
        let before = base.evaluate(&page);
        let after = extended.evaluate(&page);
        prop_assert!(after.score >= before.score,
            "adding {} moved score from {} to {}", extra, before.score, after.score);
    }

    // The score is the clamped sum of the matched weights.
    #[test]
    fn score_is_clamped_sum(weights in prop::collection::vec(-60.0f64..60.0, 1..8)) {
        let rules = load_value(&weighted_doc(&weights));
        let verdict = rules.evaluate(&login_page(weights.len()));
        let expected = weights.iter().sum::<f64>().clamp(0.0, 100.0);
        prop_assert!((verdict.score - expected).abs() < 1e-9,
            "expected {}, got {}", expected, verdict.score);
        prop_assert!((0.0..=100.0).contains(&verdict.score));
        prop_assert_eq!(verdict.matched_rule_ids.len(), weights.len());
    }

    // Same rules, same page, same verdict.
    #[test]
    fn evaluation_is_deterministic(text in "\\PC{0,300}") {
        let rules = fixture_rules();
        let page = phishing_clone().with_page_text(text);
        prop_assert_eq!(rules.evaluate(&page), rules.evaluate(&page));
    }

    // Arbitrary page text never escapes the three bands or the score range.
    #[test]
    fn arbitrary_pages_classify(text in "\\PC{0,300}", title in "\\PC{0,40}") {
        let rules = fixture_rules();
        let mut page = phishing_clone().with_title(title);
        page.page_text.push_str(&text);
        let verdict = rules.evaluate(&page);
        prop_assert!((0.0..=100.0).contains(&verdict.score));
        prop_assert!(matches!(verdict.band, Band::Legitimate | Band::Suspicious | Band::Phishing));
        prop_assert!(verdict.error.is_none());
    }
}

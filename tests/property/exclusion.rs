use crate::common::*;
use phishcheck::{Band, ReasonCode, StaticSignals};
use proptest::prelude::*;
use serde_json::json;

fn hostile_rules() -> phishcheck::ActiveRules {
    let mut doc = weighted_doc(&[-100.0]);
    doc["exclusion_system"] = json!({ "domain_patterns": ["*.excluded.example"] });
    doc["blocking_rules"] = json!([
        { "id": "block_everything", "pattern": "", "patterns": ["."], "action": "block", "severity": "critical" }
    ]);
    load_value(&doc)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // An excluded host is legitimate whatever the page contains, even with
    // a critical rule that matches any text.
    #[test]
    fn excluded_domain_always_legitimate(
        labels in prop::collection::vec("[a-z0-9]{1,10}", 0..3),
        text in "\\PC{0,200}",
    ) {
        let rules = hostile_rules();
        let mut host = labels.join(".");
        if !host.is_empty() {
            host.push('.');
        }
        host.push_str("excluded.example");

        let page = StaticSignals::new(format!("https://{}/login", host))
            .with_selector("form#login")
            .with_page_text(format!("marker0x {}", text));
        let verdict = rules.evaluate(&page);
        prop_assert_eq!(verdict.band, Band::Legitimate);
        prop_assert_eq!(verdict.indicators_evaluated, 0);
        prop_assert_eq!(&verdict.reason_codes, &vec![ReasonCode::ExcludedDomain]);
    }

    // The same page elsewhere is blocked.
    #[test]
    fn other_hosts_are_scored(label in "[a-z]{1,10}") {
        let rules = hostile_rules();
        let page = StaticSignals::new(format!("https://{}.elsewhere.example/", label))
            .with_selector("form#login")
            .with_page_text("marker0x");
        prop_assert_eq!(rules.evaluate(&page).band, Band::Phishing);
    }
}

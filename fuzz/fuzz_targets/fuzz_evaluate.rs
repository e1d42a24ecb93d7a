#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use phishcheck::{ActiveRules, StaticSignals};
use std::sync::LazyLock;

static RULES: LazyLock<ActiveRules> = LazyLock::new(|| {
    phishcheck::load(include_str!("../../tests/fixtures/m365-rules.json"))
        .expect("fixture loads")
        .rules
});

#[derive(Debug, Arbitrary)]
struct Page {
    url: String,
    title: String,
    page_text: String,
    selectors: Vec<String>,
    resources: Vec<String>,
    referrer: String,
}

fuzz_target!(|input: Page| {
    let mut page = StaticSignals::new(input.url)
        .with_title(input.title)
        .with_page_text(input.page_text)
        .with_referrer(input.referrer);
    for s in input.selectors {
        page = page.with_selector(s);
    }
    for r in input.resources {
        page = page.with_resource(r);
    }

    let first = RULES.evaluate(&page);
    assert!((0.0..=100.0).contains(&first.score));
    assert!(first.error.is_none(), "evaluation failed: {:?}", first.error);
    assert_eq!(first, RULES.evaluate(&page), "verdict is not deterministic");
});

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);

    let doc = match phishcheck::parse(&s) {
        Ok(d) => d,
        Err(_) => return,
    };

    // Validation and activation must never panic, whatever patterns the
    // document carries.
    let result = phishcheck::validate(&doc);
    if !result.is_valid() {
        return;
    }
    let (rules, report) = phishcheck::activate(&doc);
    assert_eq!(rules.activation_report(), &report);

    let page = phishcheck::StaticSignals::new("https://fuzz.example/login").with_page_text(s.to_string());
    let verdict = rules.evaluate(&page);
    assert!((0.0..=100.0).contains(&verdict.score));
});

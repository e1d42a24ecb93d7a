mod common;

use common::*;
use phishcheck::{Band, ReasonCode, RuleKind, StaticSignals};
use serde_json::{Value, json};

/// [`weighted_doc`] with no indicators and the given detection rules.
fn doc_with_rules(rules: Value) -> Value {
    let mut doc = weighted_doc(&[]);
    doc["rules"] = rules;
    doc
}

fn matched(doc: &Value, page: &StaticSignals) -> (Vec<String>, f64) {
    let verdict = load_value(doc).evaluate(page);
    (verdict.matched_rule_ids, verdict.score)
}

// ─── Condition kinds ────────────────────────────────────────────────────────

#[test]
fn domain_match_tests_the_hostname() {
    let doc = doc_with_rules(json!([
        { "id": "tenant", "weight": 40, "condition": { "domain_match": "*.example-tenant.net" } },
        { "id": "elsewhere", "weight": 7, "condition": { "domain_match": "other.example" } },
        { "id": "regex_host", "weight": 5, "condition": { "domain_match": "^login\\." } }
    ]));
    let (ids, score) = matched(&doc, &login_page(0));
    assert_eq!(ids, vec!["tenant", "regex_host"]);
    assert_eq!(score, 45.0);
}

#[test]
fn or_needs_one_member() {
    let doc = doc_with_rules(json!([
        {
            "id": "either",
            "weight": 20,
            "condition": { "or": [
                { "text_contains": "not on the page" },
                { "selector_exists": "form#login" }
            ] }
        },
        {
            "id": "neither",
            "weight": 9,
            "condition": { "or": [
                { "text_contains": "not on the page" },
                { "selector_exists": "#missing" }
            ] }
        }
    ]));
    let (ids, score) = matched(&doc, &login_page(0));
    assert_eq!(ids, vec!["either"]);
    assert_eq!(score, 20.0);
}

#[test]
fn empty_and_holds_and_empty_or_does_not() {
    let doc = doc_with_rules(json!([
        { "id": "vacuous_and", "weight": 30, "condition": { "and": [] } },
        { "id": "vacuous_or", "weight": 11, "condition": { "or": [] } }
    ]));
    let (ids, score) = matched(&doc, &login_page(0));
    assert_eq!(ids, vec!["vacuous_and"]);
    assert_eq!(score, 30.0);
}

#[test]
fn nested_groups_combine() {
    let doc = doc_with_rules(json!([
        {
            "id": "nested",
            "weight": 15,
            "condition": { "and": [
                { "domain_match": "example-tenant.net" },
                { "or": [ { "or": [] }, { "regex_match": { "pattern": "MARKER0X", "flags": "i" } } ] }
            ] }
        }
    ]));
    let (ids, _) = matched(&doc, &login_page(1));
    assert_eq!(ids, vec!["nested"]);
    let (ids, _) = matched(&doc, &login_page(0));
    assert!(ids.is_empty());
}

#[test]
fn weight_threshold_reads_the_running_score() {
    let mut doc = weighted_doc(&[50.0]);
    doc["rules"] = json!([
        { "id": "over_forty", "weight": 10, "condition": { "weight_threshold": { "min": 40 } } },
        { "id": "under_forty", "weight": -10, "condition": { "weight_threshold": { "max": 40 } } }
    ]);
    let (ids, score) = matched(&doc, &login_page(1));
    assert_eq!(ids, vec!["ind_0", "over_forty"]);
    assert_eq!(score, 60.0);
}

// ─── Resource validation ────────────────────────────────────────────────────

fn resource_doc(action: &str) -> Value {
    let mut doc = weighted_doc(&[90.0]);
    doc["detection_logic"] = json!({
        "resource_validation_rules": [
            {
                "id": "rv_login_assets",
                "pattern": "/signin",
                "required_origins": ["*.msftauth.net", "login.example-tenant.net"],
                "action": action,
                "weight": -40
            }
        ]
    });
    doc
}

#[test]
fn foreign_resource_origin_blocks() {
    let rules = load_value(&resource_doc("block"));
    assert_eq!(
        rules.rule_ids(RuleKind::ResourceValidation),
        vec!["rv_login_assets"]
    );

    let clean = login_page(1).with_resource("https://aadcdn.msftauth.net/shared/app.js");
    let verdict = rules.evaluate(&clean);
    assert_eq!(verdict.band, Band::Legitimate);
    assert_eq!(verdict.matched_rule_ids, vec!["ind_0"]);

    let hijacked = clean.with_resource("https://cdn.attacker.example/kit.js");
    let verdict = rules.evaluate(&hijacked);
    assert_eq!(verdict.band, Band::Phishing);
    assert_eq!(verdict.score, 90.0);
    assert!(verdict.reason_codes.contains(&ReasonCode::CriticalBlockingRule));
    assert_eq!(verdict.matched_rule_ids, vec!["ind_0", "rv_login_assets"]);
}

#[test]
fn warn_action_adds_weight() {
    let rules = load_value(&resource_doc("warn"));
    let page = login_page(1).with_resource("cdn.attacker.example");
    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.score, 50.0);
    assert_eq!(verdict.band, Band::Phishing);
}

#[test]
fn resource_rule_applies_only_to_matching_urls() {
    let rules = load_value(&resource_doc("block"));
    let page = StaticSignals::new("https://login.example-tenant.net/help")
        .with_selector("form#login")
        .with_page_text("marker0x")
        .with_resource("https://cdn.attacker.example/kit.js");
    let verdict = rules.evaluate(&page);
    assert_eq!(verdict.band, Band::Legitimate);
    assert_eq!(verdict.indicators_evaluated, 2);
}

#[test]
fn resource_rule_without_origins_never_matches() {
    let mut doc = resource_doc("block");
    doc["detection_logic"]["resource_validation_rules"][0]["required_origins"] = json!([]);
    let rules = load_value(&doc);
    let page = login_page(1).with_resource("https://cdn.attacker.example/kit.js");
    assert_eq!(rules.evaluate(&page).band, Band::Legitimate);
}

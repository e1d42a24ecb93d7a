#![allow(dead_code)]

use phishcheck::{ActiveRules, StaticSignals};
use serde_json::{Value, json};

pub const FIXTURE: &str = include_str!("../fixtures/m365-rules.json");

/// The fixture rule set, activated.
pub fn fixture_rules() -> ActiveRules {
    let loaded = phishcheck::load(FIXTURE).expect("fixture should load");
    assert!(loaded.report.is_clean(), "fixture disabled rules: {:?}", loaded.report);
    loaded.rules
}

/// A credential-harvesting clone of the Microsoft sign-in page on an
/// unrelated host.
pub fn phishing_clone() -> StaticSignals {
    StaticSignals::new("https://secure-login.example-verify.xyz/office/index.html")
        .with_title("Sign in to your account")
        .with_page_text(
            r#"<script src="https://aadcdn.msftauth.net/shared/1.0/content/js/ConvergedLogin.js"></script>
<script>var $Config={"urlPost":"/post.php"};</script>
<form method="post" action="https://secure-login.example-verify.xyz/next.php">
Microsoft. Your account will be suspended unless you verify. Enter password to continue.
</form>"#,
        )
        .with_selector("input[name='loginfmt']")
        .with_selector("input[type='password']")
        .with_resource("https://aadcdn.msftauth.net/shared/1.0/content/js/ConvergedLogin.js")
}

/// A document whose only fingerprint element is the `form#login` selector,
/// with one phishing indicator per weight. Indicator `i` is `ind_{i}` and
/// matches the text `marker{i}x`.
pub fn weighted_doc(weights: &[f64]) -> Value {
    let indicators: Vec<Value> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| {
            json!({
                "id": format!("ind_{}", i),
                "pattern": format!("marker{}x", i),
                "weight": w,
            })
        })
        .collect();

    json!({
        "version": "weighted",
        "m365_detection_requirements": {
            "primary_elements": [
                { "id": "login_form", "type": "selector", "pattern": "form#login", "weight": 5 }
            ],
            "detection_thresholds": {
                "minimum_primary_elements": 1,
                "minimum_total_weight": 1,
                "minimum_elements_overall": 1
            }
        },
        "thresholds": { "legitimate": 85, "suspicious": 55, "phishing": 25 },
        "phishing_indicators": indicators,
    })
}

/// A login surface for [`weighted_doc`] carrying markers `0..markers`.
pub fn login_page(markers: usize) -> StaticSignals {
    let text: Vec<String> = (0..markers).map(|i| format!("marker{}x", i)).collect();
    StaticSignals::new("https://login.example-tenant.net/signin")
        .with_selector("form#login")
        .with_page_text(text.join(" "))
}

pub fn load_value(doc: &Value) -> ActiveRules {
    phishcheck::load(&doc.to_string())
        .expect("document should load")
        .rules
}

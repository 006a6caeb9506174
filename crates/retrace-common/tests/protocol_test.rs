use retrace_common::formatter::{format_badge, format_chain, format_result, mask_sensitive};
use retrace_common::{
    AttemptOutcome, AttemptRecord, AxQuery, ChainError, EvidenceProfile, EvidenceRecord,
    FailureReason, FallbackChain, Locator, Point, PointTarget, SelectorTarget, StepAction,
    StepExecutionResult, Strategy, StrategyKind, TextTarget,
};
use std::collections::BTreeMap;

fn coordinates(x: f64, y: f64) -> Strategy {
    Strategy {
        weight: 0.60,
        locator: Locator::Coordinates(PointTarget {
            point: Point::new(x, y),
        }),
    }
}

fn full_chain() -> FallbackChain {
    let recorded = Point::new(120.0, 340.0);
    FallbackChain::new(vec![
        Strategy {
            weight: 0.95,
            locator: Locator::AccessibilitySemantic(AxQuery {
                role: Some("button".into()),
                name: Some("Submit order".into()),
                recorded_point: recorded,
            }),
        },
        Strategy {
            weight: 0.85,
            locator: Locator::DomSelector(SelectorTarget {
                selector: "[data-testid=\"submit\"]".into(),
            }),
        },
        Strategy {
            weight: 0.80,
            locator: Locator::EvidenceScoring(EvidenceProfile {
                anchor: recorded,
                tag: Some("button".into()),
                attributes: BTreeMap::from([("id".to_string(), "submit-btn".to_string())]),
            }),
        },
        Strategy {
            weight: 0.70,
            locator: Locator::TextOcr(TextTarget {
                text: "Submit".into(),
                recorded_point: recorded,
            }),
        },
        coordinates(120.0, 340.0),
    ])
    .unwrap()
}

#[test]
fn test_chain_roundtrip() {
    let chain = full_chain();
    let json = chain.to_json().unwrap();
    assert_eq!(FallbackChain::from_json(&json).unwrap(), chain);

    let only_coords = FallbackChain::new(vec![coordinates(50.0, 50.0)]).unwrap();
    let json = only_coords.to_json().unwrap();
    assert_eq!(FallbackChain::from_json(&json).unwrap(), only_coords);
}

#[test]
fn test_locator_wire_format() {
    let strategy = Strategy {
        weight: 0.75,
        locator: Locator::CssSelector(SelectorTarget {
            selector: "#main > button".into(),
        }),
    };
    let value = serde_json::to_value(&strategy).unwrap();
    assert_eq!(value["weight"], 0.75);
    assert_eq!(value["locator"]["kind"], "css_selector");
    assert_eq!(value["locator"]["selector"], "#main > button");
}

#[test]
fn test_old_chain_without_optional_fields_decodes() {
    // An accessibility entry written before `name` existed, and an
    // evidence profile without tag/attributes.
    let json = r#"{"strategies":[
        {"weight":0.9,"locator":{"kind":"accessibility_locator","role":"link","recorded_point":{"x":1.0,"y":2.0}}},
        {"weight":0.8,"locator":{"kind":"evidence_scoring","anchor":{"x":1.0,"y":2.0}}},
        {"weight":0.6,"locator":{"kind":"coordinates","point":{"x":1.0,"y":2.0}}}
    ]}"#;
    let chain = FallbackChain::from_json(json).unwrap();
    assert_eq!(
        chain.kinds(),
        vec![
            StrategyKind::AccessibilityLocator,
            StrategyKind::EvidenceScoring,
            StrategyKind::Coordinates
        ]
    );
    match &chain.strategies()[0].locator {
        Locator::AccessibilityLocator(q) => {
            assert_eq!(q.role.as_deref(), Some("link"));
            assert!(q.name.is_none());
        }
        other => panic!("unexpected locator {:?}", other),
    }
    match &chain.strategies()[1].locator {
        Locator::EvidenceScoring(p) => {
            assert!(p.tag.is_none());
            assert!(p.attributes.is_empty());
        }
        other => panic!("unexpected locator {:?}", other),
    }
}

#[test]
fn test_invalid_chains_rejected() {
    assert!(matches!(
        FallbackChain::from_json(r#"{"strategies":[]}"#),
        Err(ChainError::Empty)
    ));

    let json = r##"{"strategies":[{"weight":0.75,"locator":{"kind":"css_selector","selector":"#a"}}]}"##;
    assert!(matches!(
        FallbackChain::from_json(json),
        Err(ChainError::MissingCoordinates(StrategyKind::CssSelector))
    ));

    assert!(matches!(
        FallbackChain::from_json("not json"),
        Err(ChainError::Decode(_))
    ));
}

#[test]
fn test_evidence_record_minimal_and_null_attributes() {
    let record: EvidenceRecord = serde_json::from_str(r#"{"raw_point":{"x":50.0,"y":50.0}}"#).unwrap();
    assert_eq!(record, EvidenceRecord::at(Point::new(50.0, 50.0)));

    let json = r#"{
        "raw_point":{"x":1.0,"y":1.0},
        "dom":{"tag":"input","attributes":{"name":"email","placeholder":null}}
    }"#;
    let record: EvidenceRecord = serde_json::from_str(json).unwrap();
    let dom = record.dom.unwrap();
    assert_eq!(dom.attributes.len(), 1);
    assert_eq!(dom.attributes["name"], "email");
    assert!(!dom.css_selector_unique);
}

#[test]
fn test_result_serialization() {
    let result = StepExecutionResult::action_failed(
        StrategyKind::DomSelector,
        1,
        "no observable effect".into(),
        vec![],
    );
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["succeeded"], false);
    assert_eq!(value["strategy_used"], "dom_selector");
    assert_eq!(value["failure"]["code"], "action_failed");
    assert_eq!(value["failure"]["reason"], "no observable effect");

    let decoded: StepExecutionResult = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, result);
    assert!(decoded.located());
}

#[test]
fn test_step_action_wire_format() {
    let action = StepAction::Type {
        text: "hello".into(),
    };
    let value = serde_json::to_value(&action).unwrap();
    assert_eq!(value["type"], "type");
    assert_eq!(value["text"], "hello");
    assert_eq!(serde_json::to_value(StepAction::Click).unwrap()["type"], "click");
}

#[test]
fn test_format_result_badges() {
    let log = vec![
        AttemptRecord {
            kind: StrategyKind::AccessibilitySemantic,
            outcome: AttemptOutcome::NotFound,
            duration_ms: 3,
            ambiguous: false,
            speculative: false,
            reason: None,
        },
        AttemptRecord {
            kind: StrategyKind::CssSelector,
            outcome: AttemptOutcome::Found,
            duration_ms: 1,
            ambiguous: true,
            speculative: false,
            reason: None,
        },
    ];
    let ok = StepExecutionResult::success(StrategyKind::CssSelector, 1, log);
    assert_eq!(format_badge(&ok), "ok [css_selector] after 1 fallback");
    let text = format_result(&ok);
    assert!(text.contains("accessibility_semantic"));
    assert!(text.contains("{ambiguous}"));

    let failed = StepExecutionResult::not_located(FailureReason::DeadlineExceeded, vec![]);
    assert_eq!(format_badge(&failed), "FAILED [deadline_exceeded] after 0 attempts");
}

#[test]
fn test_format_chain_lists_every_strategy() {
    let text = format_chain(&full_chain());
    assert_eq!(text.lines().count(), 5);
    assert!(text.lines().last().unwrap().contains("(120,340)"));
}

#[test]
fn test_mask_sensitive() {
    assert_eq!(mask_sensitive("hunter2", "user_password", &[]), "••••••••");
    assert_eq!(mask_sensitive("alice", "username", &[]), "alice");
    assert_eq!(
        mask_sensitive("1234", "pin_code", &["pin".to_string()]),
        "••••••••"
    );
}

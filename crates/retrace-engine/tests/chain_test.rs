mod common;

use common::full_evidence;
use retrace_common::{
    AccessibilitySnapshot, DomSnapshot, EvidenceRecord, FallbackChain, Locator, Point,
    PointTarget, PointerTrail, Strategy, StrategyKind, TrailSample, VisibleText,
};
use retrace_engine::scoring::{
    ChainBuilder, MAX_CHAIN_LEN, StrategyScorer, WeightError, WeightTable, build_fallback_chain,
    build_fallback_chain_with,
};

fn assert_chain_shape(chain: &FallbackChain) {
    assert!(!chain.is_empty());
    assert!(chain.len() <= MAX_CHAIN_LEN);
    assert_eq!(
        chain.strategies().last().map(Strategy::kind),
        Some(StrategyKind::Coordinates)
    );
    for pair in chain.strategies().windows(2) {
        assert!(
            pair[0].weight >= pair[1].weight,
            "{} ({}) before {} ({})",
            pair[0].kind(),
            pair[0].weight,
            pair[1].kind(),
            pair[1].weight
        );
    }
}

/// Every subset of the optional evidence fields.
fn evidence_variants() -> Vec<EvidenceRecord> {
    let full = full_evidence();
    (0..32u32)
        .map(|mask| {
            let mut e = EvidenceRecord::at(full.raw_point);
            if mask & 1 != 0 {
                e.dom = full.dom.clone();
            }
            if mask & 2 != 0 {
                e.accessibility = full.accessibility.clone();
            }
            if mask & 4 != 0 {
                e.visible_text = full.visible_text.clone();
            }
            if mask & 8 != 0 {
                e.pointer_trail = full.pointer_trail.clone();
            }
            if mask & 16 != 0 {
                e.network = full.network.clone();
            }
            e
        })
        .collect()
}

#[test]
fn test_chain_never_empty_and_ends_with_coordinates() {
    for evidence in evidence_variants() {
        let chain = build_fallback_chain(&evidence);
        assert_chain_shape(&chain);
    }
}

#[test]
fn test_full_evidence_chain() {
    let chain = build_fallback_chain(&full_evidence());

    assert_eq!(
        chain.kinds(),
        vec![
            StrategyKind::AccessibilitySemantic,
            StrategyKind::DomSelector,
            StrategyKind::EvidenceScoring,
            StrategyKind::CssSelector,
            StrategyKind::TextOcr,
            StrategyKind::Coordinates,
        ]
    );
    assert_eq!(chain.get(0).map(|s| s.weight), Some(0.95));
    assert_eq!(chain.get(5).map(|s| s.weight), Some(0.60));
    assert_eq!(
        chain.get(5).map(|s| &s.locator),
        Some(&Locator::Coordinates(PointTarget {
            point: Point::new(120.0, 340.0)
        }))
    );
}

#[test]
fn test_raw_point_only_chain() {
    let chain = build_fallback_chain(&EvidenceRecord::at(Point::new(50.0, 50.0)));
    assert_eq!(chain.kinds(), vec![StrategyKind::Coordinates]);
}

#[test]
fn test_chain_building_is_idempotent() {
    for evidence in evidence_variants() {
        let first = build_fallback_chain(&evidence);
        let mut later = evidence.clone();
        later.captured_at_ms += 5_000;
        let second = build_fallback_chain(&later);
        assert_eq!(first, second);
    }
}

#[test]
fn test_accessibility_name_only_uses_locator_tier() {
    let mut evidence = EvidenceRecord::at(Point::new(10.0, 10.0));
    evidence.accessibility = Some(AccessibilitySnapshot {
        role: None,
        name: Some("Search".into()),
        description: None,
    });
    assert_eq!(
        build_fallback_chain(&evidence).kinds(),
        vec![StrategyKind::AccessibilityLocator, StrategyKind::Coordinates]
    );

    evidence.accessibility = Some(AccessibilitySnapshot {
        role: Some("  ".into()),
        name: None,
        description: Some("ignored".into()),
    });
    assert_eq!(
        build_fallback_chain(&evidence).kinds(),
        vec![StrategyKind::Coordinates]
    );
}

#[test]
fn test_non_unique_css_selector_is_dropped() {
    let mut evidence = EvidenceRecord::at(Point::new(10.0, 10.0));
    evidence.dom = Some(DomSnapshot {
        tag: "a".into(),
        css_selector: Some("a.nav".into()),
        css_selector_unique: false,
        ..Default::default()
    });
    assert_eq!(
        build_fallback_chain(&evidence).kinds(),
        vec![StrategyKind::Coordinates]
    );
}

#[test]
fn test_blank_visible_text_is_ignored() {
    let mut evidence = EvidenceRecord::at(Point::new(10.0, 10.0));
    evidence.visible_text = Some(VisibleText {
        text: " \n ".into(),
        bounds: None,
    });
    assert_eq!(
        build_fallback_chain(&evidence).kinds(),
        vec![StrategyKind::Coordinates]
    );
}

#[test]
fn test_evidence_profile_anchors_on_trail_end() {
    let mut evidence = EvidenceRecord::at(Point::new(10.0, 10.0));
    evidence.pointer_trail = Some(PointerTrail {
        samples: vec![TrailSample {
            x: 14.0,
            y: 12.0,
            timestamp_ms: 1,
        }],
        end_tag: Some("A".into()),
    });
    let chain = build_fallback_chain(&evidence);
    let Some(Locator::EvidenceScoring(profile)) = chain.get(0).map(|s| &s.locator) else {
        panic!("expected evidence scoring first, got {:?}", chain.kinds());
    };
    assert_eq!(profile.anchor, Point::new(14.0, 12.0));
    assert_eq!(profile.tag.as_deref(), Some("a"));
    assert!(profile.attributes.is_empty());
}

#[test]
fn test_evidence_profile_skips_value_of_form_controls() {
    let trail = PointerTrail {
        samples: vec![],
        end_tag: None,
    };
    let profile_of = |tag: &str| {
        let mut evidence = EvidenceRecord::at(Point::new(10.0, 10.0));
        evidence.dom = Some(DomSnapshot {
            tag: tag.into(),
            attributes: [
                ("value".to_string(), "draft".to_string()),
                ("placeholder".to_string(), "Email".to_string()),
            ]
            .into(),
            ..Default::default()
        });
        evidence.pointer_trail = Some(trail.clone());
        let chain = build_fallback_chain(&evidence);
        chain
            .strategies()
            .iter()
            .find_map(|s| match &s.locator {
                Locator::EvidenceScoring(profile) => Some(profile.clone()),
                _ => None,
            })
            .expect("evidence scoring strategy")
    };

    for tag in ["input", "SELECT", "textarea"] {
        let profile = profile_of(tag);
        assert!(!profile.attributes.contains_key("value"), "{tag}");
        assert_eq!(profile.attributes.get("placeholder").map(String::as_str), Some("Email"));
    }
    let button = profile_of("button");
    assert_eq!(button.attributes.get("value").map(String::as_str), Some("draft"));
}

#[test]
fn test_injected_weights_reorder_but_keep_coordinates_last() {
    let weights = WeightTable {
        text_ocr: 0.99,
        ..WeightTable::DEFAULT
    };
    let chain = build_fallback_chain_with(&full_evidence(), weights);
    assert_eq!(chain.kinds()[0], StrategyKind::TextOcr);
    assert_chain_shape(&chain);
}

#[test]
fn test_builder_forces_coordinates_last_under_bad_weights() {
    let weights = WeightTable {
        coordinates: 0.99,
        ..WeightTable::DEFAULT
    };
    assert!(matches!(
        weights.validate(),
        Err(WeightError::CoordinatesNotLowest { .. })
    ));

    let chain = build_fallback_chain_with(&full_evidence(), weights);
    assert_eq!(chain.kinds().last(), Some(&StrategyKind::Coordinates));
    assert_eq!(chain.kinds()[0], StrategyKind::AccessibilitySemantic);
}

#[test]
fn test_builder_dedupes_and_caps() {
    let scorer = StrategyScorer::new(WeightTable::DEFAULT);
    let mut candidates = scorer.score(&full_evidence());
    candidates.extend(scorer.score(&full_evidence()));
    for i in 0..10 {
        candidates.push(Strategy {
            weight: 0.5,
            locator: Locator::Coordinates(PointTarget {
                point: Point::new(i as f64, 0.0),
            }),
        });
    }

    let chain = ChainBuilder::new(WeightTable::DEFAULT).build(candidates, Point::new(0.0, 0.0));
    assert_eq!(chain.len(), MAX_CHAIN_LEN);
    assert_eq!(chain.kinds().last(), Some(&StrategyKind::Coordinates));
    assert_eq!(
        chain.get(MAX_CHAIN_LEN - 1).map(|s| &s.locator),
        Some(&Locator::Coordinates(PointTarget {
            point: Point::new(120.0, 340.0)
        }))
    );
}

#[test]
fn test_chain_survives_json_round_trip() {
    for evidence in evidence_variants() {
        let chain = build_fallback_chain(&evidence);
        let json = chain.to_json().unwrap();
        assert_eq!(FallbackChain::from_json(&json).unwrap(), chain);
    }
}

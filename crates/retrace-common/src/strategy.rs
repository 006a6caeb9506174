use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The closed set of relocation strategies, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    AccessibilitySemantic,
    AccessibilityLocator,
    DomSelector,
    CssSelector,
    EvidenceScoring,
    TextOcr,
    Coordinates,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::AccessibilitySemantic,
        StrategyKind::AccessibilityLocator,
        StrategyKind::DomSelector,
        StrategyKind::CssSelector,
        StrategyKind::EvidenceScoring,
        StrategyKind::TextOcr,
        StrategyKind::Coordinates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::AccessibilitySemantic => "accessibility_semantic",
            StrategyKind::AccessibilityLocator => "accessibility_locator",
            StrategyKind::DomSelector => "dom_selector",
            StrategyKind::CssSelector => "css_selector",
            StrategyKind::EvidenceScoring => "evidence_scoring",
            StrategyKind::TextOcr => "text_ocr",
            StrategyKind::Coordinates => "coordinates",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific metadata for one strategy. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    DomSelector(SelectorTarget),
    CssSelector(SelectorTarget),
    AccessibilitySemantic(AxQuery),
    AccessibilityLocator(AxQuery),
    EvidenceScoring(EvidenceProfile),
    TextOcr(TextTarget),
    Coordinates(PointTarget),
}

impl Locator {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Locator::DomSelector(_) => StrategyKind::DomSelector,
            Locator::CssSelector(_) => StrategyKind::CssSelector,
            Locator::AccessibilitySemantic(_) => StrategyKind::AccessibilitySemantic,
            Locator::AccessibilityLocator(_) => StrategyKind::AccessibilityLocator,
            Locator::EvidenceScoring(_) => StrategyKind::EvidenceScoring,
            Locator::TextOcr(_) => StrategyKind::TextOcr,
            Locator::Coordinates(_) => StrategyKind::Coordinates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorTarget {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Where the action originally happened; breaks ties between matches.
    pub recorded_point: Point,
}

/// Attribute fingerprint of the original element, anchored at the end of
/// the pointer trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceProfile {
    pub anchor: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EvidenceProfile {
    /// Number of features a candidate can match: the tag plus each attribute.
    pub fn feature_count(&self) -> usize {
        self.attributes.len() + usize::from(self.tag.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextTarget {
    pub text: String,
    pub recorded_point: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTarget {
    pub point: Point,
}

/// One candidate way to relocate the element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub weight: f64,
    pub locator: Locator,
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        self.locator.kind()
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Fallback chain is empty")]
    Empty,
    #[error("Fallback chain must end with a coordinates strategy, found {0}")]
    MissingCoordinates(StrategyKind),
    #[error("Failed to decode fallback chain: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Ordered relocation strategies for one recorded step, highest confidence
/// first. Constructed once at record time and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackChain {
    strategies: Vec<Strategy>,
}

impl FallbackChain {
    /// Wrap an already ordered strategy list.
    pub fn new(strategies: Vec<Strategy>) -> Result<Self, ChainError> {
        let chain = Self { strategies };
        chain.validate()?;
        Ok(chain)
    }

    /// Build a chain whose final entry is the coordinates strategy for
    /// `terminal`. Cannot produce an invalid chain.
    pub fn terminated(mut head: Vec<Strategy>, terminal: PointTarget, weight: f64) -> Self {
        head.push(Strategy {
            weight,
            locator: Locator::Coordinates(terminal),
        });
        Self { strategies: head }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        match self.strategies.last() {
            None => Err(ChainError::Empty),
            Some(last) if last.kind() != StrategyKind::Coordinates => {
                Err(ChainError::MissingCoordinates(last.kind()))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Strategy> {
        self.strategies.get(index)
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(Strategy::kind).collect()
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate a persisted chain.
    pub fn from_json(json: &str) -> Result<Self, ChainError> {
        let chain: FallbackChain = serde_json::from_str(json)?;
        chain.validate()?;
        Ok(chain)
    }
}

/// The user action a step replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Click,
    Type { text: String },
    Select { value: String },
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Click => "click",
            StepAction::Type { .. } => "type",
            StepAction::Select { .. } => "select",
        }
    }
}

/// A recorded action together with its fallback chain, as persisted by the
/// storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedStep {
    pub id: String,
    pub action: StepAction,
    pub chain: FallbackChain,
    /// Name of the field the action targeted, used for masking typed text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

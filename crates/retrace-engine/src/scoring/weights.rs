use retrace_common::StrategyKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WeightError {
    #[error("Weight for {kind} must be in (0, 1], got {weight}")]
    OutOfRange { kind: StrategyKind, weight: f64 },
    #[error("Coordinates must carry the lowest weight, but {kind} has {weight}")]
    CoordinatesNotLowest { kind: StrategyKind, weight: f64 },
}

/// Fixed confidence weight per strategy kind.
///
/// Weights are not read from configuration. Callers that need a different
/// table (tests, experiments) construct one and pass it explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTable {
    pub accessibility_semantic: f64,
    pub accessibility_locator: f64,
    pub dom_selector: f64,
    pub css_selector: f64,
    pub evidence_scoring: f64,
    pub text_ocr: f64,
    pub coordinates: f64,
}

impl WeightTable {
    pub const DEFAULT: WeightTable = WeightTable {
        accessibility_semantic: 0.95,
        accessibility_locator: 0.90,
        dom_selector: 0.85,
        evidence_scoring: 0.80,
        css_selector: 0.75,
        text_ocr: 0.70,
        coordinates: 0.60,
    };

    pub fn weight(&self, kind: StrategyKind) -> f64 {
        match kind {
            StrategyKind::AccessibilitySemantic => self.accessibility_semantic,
            StrategyKind::AccessibilityLocator => self.accessibility_locator,
            StrategyKind::DomSelector => self.dom_selector,
            StrategyKind::CssSelector => self.css_selector,
            StrategyKind::EvidenceScoring => self.evidence_scoring,
            StrategyKind::TextOcr => self.text_ocr,
            StrategyKind::Coordinates => self.coordinates,
        }
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        for kind in StrategyKind::ALL {
            let weight = self.weight(kind);
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(WeightError::OutOfRange { kind, weight });
            }
            if kind != StrategyKind::Coordinates && weight <= self.coordinates {
                return Err(WeightError::CoordinatesNotLowest { kind, weight });
            }
        }
        Ok(())
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        assert_eq!(WeightTable::DEFAULT.validate(), Ok(()));
        assert_eq!(
            WeightTable::DEFAULT.weight(StrategyKind::AccessibilitySemantic),
            0.95
        );
        assert_eq!(WeightTable::DEFAULT.weight(StrategyKind::Coordinates), 0.60);
    }

    #[test]
    fn test_rejects_coordinates_above_others() {
        let table = WeightTable {
            text_ocr: 0.5,
            ..WeightTable::DEFAULT
        };
        assert_eq!(
            table.validate(),
            Err(WeightError::CoordinatesNotLowest {
                kind: StrategyKind::TextOcr,
                weight: 0.5
            })
        );
    }

    #[test]
    fn test_rejects_out_of_range() {
        let table = WeightTable {
            dom_selector: 1.5,
            ..WeightTable::DEFAULT
        };
        assert!(matches!(
            table.validate(),
            Err(WeightError::OutOfRange { .. })
        ));
    }
}

use crate::result::{FailureReason, StepExecutionResult};
use crate::strategy::{FallbackChain, Locator, StepAction};

/// Field names whose typed values are masked in output.
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "key",
    "cvv",
    "ssn",
    "card_number",
    "credit_card",
];

/// Render a playback result: a badge line followed by one line per attempt.
///
/// ```text
/// ok [evidence_scoring] after 2 fallbacks
///   1. accessibility_semantic  not_found        3ms
///   2. dom_selector            not_found        1ms
///   3. evidence_scoring        found            4ms
/// ```
pub fn format_result(result: &StepExecutionResult) -> String {
    let mut output = format_badge(result);
    output.push('\n');

    for (i, attempt) in result.per_attempt_log.iter().enumerate() {
        let mut flags = Vec::new();
        if attempt.ambiguous {
            flags.push("ambiguous");
        }
        if attempt.speculative {
            flags.push("speculative");
        }
        let flags_str = if flags.is_empty() {
            String::new()
        } else {
            format!(" {{{}}}", flags.join(", "))
        };
        let reason = attempt
            .reason
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default();

        output.push_str(&format!(
            "  {}. {:<24} {:<16} {}ms{}{}\n",
            i + 1,
            attempt.kind.as_str(),
            attempt.outcome.as_str(),
            attempt.duration_ms,
            flags_str,
            reason
        ));
    }

    output
}

/// The one-line "strategy badge" shown next to a step.
pub fn format_badge(result: &StepExecutionResult) -> String {
    match (&result.strategy_used, &result.failure) {
        (Some(kind), None) => {
            let fallbacks = result.attempts_before_success;
            let noun = if fallbacks == 1 { "fallback" } else { "fallbacks" };
            format!("ok [{}] after {} {}", kind, fallbacks, noun)
        }
        (Some(kind), Some(FailureReason::ActionFailed { reason })) => {
            format!("FAILED action via [{}]: {}", kind, reason)
        }
        (_, Some(reason)) => format!(
            "FAILED [{}] after {} attempts",
            reason.code(),
            result.per_attempt_log.len()
        ),
        (None, None) => "FAILED [unknown]".to_string(),
    }
}

/// Render a chain as one line per strategy.
pub fn format_chain(chain: &FallbackChain) -> String {
    let mut output = String::new();
    for (i, strategy) in chain.strategies().iter().enumerate() {
        output.push_str(&format!(
            "{}. {:<24} {:.2}  {}\n",
            i + 1,
            strategy.kind().as_str(),
            strategy.weight,
            describe_locator(&strategy.locator)
        ));
    }
    output
}

fn describe_locator(locator: &Locator) -> String {
    match locator {
        Locator::DomSelector(t) | Locator::CssSelector(t) => t.selector.clone(),
        Locator::AccessibilitySemantic(q) | Locator::AccessibilityLocator(q) => format!(
            "role={} name={:?}",
            q.role.as_deref().unwrap_or("*"),
            q.name.as_deref().unwrap_or("*")
        ),
        Locator::EvidenceScoring(p) => format!(
            "{} features near ({:.0},{:.0})",
            p.feature_count(),
            p.anchor.x,
            p.anchor.y
        ),
        Locator::TextOcr(t) => format!("{:?}", t.text),
        Locator::Coordinates(p) => format!("({:.0},{:.0})", p.point.x, p.point.y),
    }
}

/// Describe an action for logs, masking typed text for sensitive fields.
pub fn describe_action(action: &StepAction, field_name: &str, sensitive_fields: &[String]) -> String {
    match action {
        StepAction::Click => "click".to_string(),
        StepAction::Type { text } => format!(
            "type {:?}",
            mask_sensitive(text, field_name, sensitive_fields)
        ),
        StepAction::Select { value } => format!("select {:?}", value),
    }
}

pub fn mask_sensitive(value: &str, field_name: &str, sensitive_fields: &[String]) -> String {
    let lower_field = field_name.to_lowercase();

    let is_sensitive = sensitive_fields
        .iter()
        .any(|f| lower_field.contains(&f.to_lowercase()))
        || DEFAULT_SENSITIVE_FIELDS
            .iter()
            .any(|f| lower_field.contains(*f));

    if is_sensitive {
        "••••••••".to_string()
    } else {
        value.to_string()
    }
}

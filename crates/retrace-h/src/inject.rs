use chromiumoxide::Page;
use retrace_engine::SessionError;
use serde::de::DeserializeOwned;
use std::time::Duration;

const HELPER_JS: &str = include_str!("page_helper.js");

/// Upper bound on a single evaluation. A dialog that slipped past the
/// auto-accept listener blocks the JS thread until this fires.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries while the page is between execution contexts (navigating).
const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

async fn evaluate_with_timeout(
    page: &Page,
    expression: &str,
) -> Result<serde_json::Value, EvalError> {
    match tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(remote_object)) => remote_object
            .into_value::<serde_json::Value>()
            .map_err(|e| EvalError::Other(format!("Failed to read result: {}", e))),
    }
}

/// Evaluate `expression`, retrying through navigations.
async fn evaluate(page: &Page, expression: &str) -> Result<serde_json::Value, SessionError> {
    let mut last_error = None;
    for attempt in 0..MAX_CONTEXT_RETRIES {
        match evaluate_with_timeout(page, expression).await {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(SessionError::Script(
                    "evaluation timed out, possibly blocked by a dialog".into(),
                ));
            }
            Err(EvalError::Context(err)) => {
                tracing::debug!(
                    "Context error (attempt {}/{}), retrying",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err)) => return Err(SessionError::Script(err)),
        }
    }
    Err(SessionError::Script(last_error.unwrap_or_else(|| {
        "evaluation failed after retries".to_string()
    })))
}

/// Install `window.__retrace` unless the current document already has it.
pub async fn ensure_helper(page: &Page) -> Result<(), SessionError> {
    let loaded = evaluate(page, "typeof window.__retrace !== 'undefined'").await?;
    if loaded != serde_json::Value::Bool(true) {
        evaluate(page, HELPER_JS).await?;
    }
    Ok(())
}

/// Call `window.__retrace.<function>(args...)` and decode its result.
///
/// The helper is re-injected before every call: a navigation between calls
/// replaces the document and drops it.
pub async fn call_helper<T: DeserializeOwned>(
    page: &Page,
    function: &str,
    args: &[serde_json::Value],
) -> Result<T, SessionError> {
    let args = args
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    let expression = format!("window.__retrace.{}({})", function, args);

    ensure_helper(page).await?;
    let value = evaluate(page, &expression).await?;
    Ok(serde_json::from_value(value)?)
}

/// Like [`call_helper`], but a document without the helper answers `missing`
/// instead of getting a fresh helper. Used after actions, where a missing
/// helper means the action navigated away.
pub async fn call_helper_or<T: DeserializeOwned>(
    page: &Page,
    function: &str,
    missing: &str,
) -> Result<T, SessionError> {
    let expression = format!(
        "typeof window.__retrace === 'undefined' ? {} : window.__retrace.{}()",
        missing, function
    );
    let value = evaluate(page, &expression).await?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_errors() {
        assert!(is_context_error("Cannot find context with specified id"));
        assert!(is_context_error("Execution context was destroyed."));
        assert!(!is_context_error("ReferenceError: foo is not defined"));
    }

    #[test]
    fn test_helper_defines_namespace() {
        assert!(HELPER_JS.contains("window.__retrace ="));
        for function in [
            "query", "axTree", "viewport", "dpr", "rect", "state", "hitTest", "at", "describe",
            "near", "focus", "select", "markAction", "effect",
        ] {
            assert!(
                HELPER_JS.contains(&format!("{}(", function)),
                "helper is missing {}",
                function
            );
        }
    }
}

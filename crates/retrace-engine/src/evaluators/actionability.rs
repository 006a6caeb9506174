//! Shared actionability check.
//!
//! An element is actionable when it is attached, has a rendered size, is
//! visible, is enabled and is not covered by another element at its center.

use crate::session::{ElementRef, PageSession, SessionError};
use retrace_common::Point;

#[derive(Debug, Clone, PartialEq)]
pub enum Actionability {
    Actionable(Point),
    Blocked(String),
}

pub async fn check(
    session: &dyn PageSession,
    element: ElementRef,
) -> Result<Actionability, SessionError> {
    let state = session.element_state(element).await?;
    if !state.attached {
        return Ok(Actionability::Blocked("element detached".into()));
    }

    let Some(rect) = session.bounding_box(element).await? else {
        return Ok(Actionability::Blocked("element detached".into()));
    };
    if !rect.has_size() {
        return Ok(Actionability::Blocked(format!(
            "zero size ({}x{})",
            rect.width, rect.height
        )));
    }
    if !state.visible {
        return Ok(Actionability::Blocked("element hidden".into()));
    }
    if !state.enabled {
        return Ok(Actionability::Blocked("element disabled".into()));
    }

    let center = rect.center();
    if !session.hit_test(element, center).await? {
        return Ok(Actionability::Blocked(format!(
            "covered at ({:.0},{:.0})",
            center.x, center.y
        )));
    }

    Ok(Actionability::Actionable(center))
}

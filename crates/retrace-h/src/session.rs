use crate::inject::{call_helper, call_helper_or};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::page::ScreenshotParams;
use retrace_common::{Point, Rect};
use retrace_engine::session::{
    AxNode, ElementDescription, ElementRef, ElementState, PageSession, Screenshot, SessionError,
    Viewport,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    ids: Vec<ElementRef>,
    #[serde(default)]
    error: Option<String>,
}

/// [`PageSession`] over one chromiumoxide page.
///
/// Reads go through the injected `window.__retrace` helper; input goes
/// through CDP so the page sees trusted events.
#[derive(Clone)]
pub struct HeadlessSession {
    page: Page,
}

impl HeadlessSession {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn mark_action(&self) -> Result<(), SessionError> {
        call_helper::<bool>(&self.page, "markAction", &[]).await?;
        Ok(())
    }

    async fn mouse(
        &self,
        kind: DispatchMouseEventType,
        point: Point,
        click_count: i64,
    ) -> Result<(), SessionError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(point.x)
            .y(point.y)
            .button(MouseButton::Left)
            .click_count(click_count)
            .build()
            .map_err(SessionError::Dispatch)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| SessionError::Dispatch(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PageSession for HeadlessSession {
    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementRef>, SessionError> {
        let result: QueryResult = call_helper(&self.page, "query", &[json!(selector)]).await?;
        match result.error {
            Some(e) => Err(SessionError::InvalidSelector(format!("{}: {}", selector, e))),
            None => Ok(result.ids),
        }
    }

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>, SessionError> {
        call_helper(&self.page, "axTree", &[]).await
    }

    async fn capture_screenshot(&self) -> Result<Screenshot, SessionError> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| SessionError::Other(format!("Screenshot failed: {}", e)))?;
        let (width, height) = png_dimensions(&png)
            .ok_or_else(|| SessionError::Other("Screenshot is not a PNG".into()))?;
        let scale: f64 = call_helper(&self.page, "dpr", &[]).await?;
        Ok(Screenshot {
            png,
            width,
            height,
            scale,
        })
    }

    async fn viewport(&self) -> Result<Viewport, SessionError> {
        call_helper(&self.page, "viewport", &[]).await
    }

    async fn bounding_box(&self, element: ElementRef) -> Result<Option<Rect>, SessionError> {
        call_helper(&self.page, "rect", &[json!(element.0)]).await
    }

    async fn element_state(&self, element: ElementRef) -> Result<ElementState, SessionError> {
        call_helper(&self.page, "state", &[json!(element.0)]).await
    }

    async fn hit_test(&self, element: ElementRef, point: Point) -> Result<bool, SessionError> {
        call_helper(
            &self.page,
            "hitTest",
            &[json!(element.0), json!(point.x), json!(point.y)],
        )
        .await
    }

    async fn element_at_point(&self, point: Point) -> Result<Option<ElementRef>, SessionError> {
        call_helper(&self.page, "at", &[json!(point.x), json!(point.y)]).await
    }

    async fn describe_element(
        &self,
        element: ElementRef,
    ) -> Result<Option<ElementDescription>, SessionError> {
        call_helper(&self.page, "describe", &[json!(element.0)]).await
    }

    async fn elements_near(
        &self,
        point: Point,
        radius: f64,
    ) -> Result<Vec<ElementDescription>, SessionError> {
        call_helper(
            &self.page,
            "near",
            &[json!(point.x), json!(point.y), json!(radius)],
        )
        .await
    }

    async fn dispatch_click(&self, point: Point) -> Result<(), SessionError> {
        self.mark_action().await?;
        self.mouse(DispatchMouseEventType::MouseMoved, point, 0).await?;
        self.mouse(DispatchMouseEventType::MousePressed, point, 1).await?;
        self.mouse(DispatchMouseEventType::MouseReleased, point, 1).await
    }

    async fn dispatch_type(&self, element: ElementRef, text: &str) -> Result<(), SessionError> {
        let focused: bool = call_helper(&self.page, "focus", &[json!(element.0)]).await?;
        if !focused {
            return Err(SessionError::Dispatch(format!(
                "element {:?} did not take focus",
                element
            )));
        }
        self.mark_action().await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(|e| SessionError::Dispatch(e.to_string()))?;
        Ok(())
    }

    async fn dispatch_select(&self, element: ElementRef, value: &str) -> Result<(), SessionError> {
        self.mark_action().await?;
        let selected: bool =
            call_helper(&self.page, "select", &[json!(element.0), json!(value)]).await?;
        if selected {
            Ok(())
        } else {
            Err(SessionError::Dispatch(format!(
                "no option matching {:?}",
                value
            )))
        }
    }

    /// A document without the helper was loaded after the action, which
    /// counts as an effect.
    async fn confirm_effect(&self) -> Result<bool, SessionError> {
        call_helper_or(&self.page, "effect", "true").await
    }
}

/// Width and height from the IHDR chunk of a PNG.
fn png_dimensions(png: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    if png.len() < 24 || png[..8] != SIGNATURE || &png[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(png[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(png[20..24].try_into().ok()?);
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_dimensions() {
        let mut header = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        header.extend_from_slice(&13u32.to_be_bytes());
        header.extend_from_slice(b"IHDR");
        header.extend_from_slice(&2560u32.to_be_bytes());
        header.extend_from_slice(&1600u32.to_be_bytes());
        assert_eq!(png_dimensions(&header), Some((2560, 1600)));

        assert_eq!(png_dimensions(b"GIF89a"), None);
        header[1] = b'X';
        assert_eq!(png_dimensions(&header), None);
    }

    #[test]
    fn test_query_result_shapes() {
        let ok: QueryResult = serde_json::from_str(r#"{"ids":[3,7]}"#).unwrap();
        assert_eq!(ok.ids, vec![ElementRef(3), ElementRef(7)]);
        assert!(ok.error.is_none());

        let bad: QueryResult =
            serde_json::from_str(r#"{"ids":[],"error":"'!x' is not a valid selector"}"#).unwrap();
        assert!(bad.error.is_some());
    }
}

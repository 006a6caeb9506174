use crate::cdp::CdpClient;
use crate::inject::ensure_helper;
use crate::session::HeadlessSession;
use retrace_engine::PageHandle;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Browser error: {0}")]
    Other(String),
}

/// One launched browser and the page recordings are captured on and
/// replayed against.
pub struct HeadlessBrowser {
    client: CdpClient,
    handle: PageHandle,
}

impl HeadlessBrowser {
    pub async fn launch(visible: bool) -> Result<Self, BrowserError> {
        let client = CdpClient::launch(visible).await?;
        let session = HeadlessSession::new(client.page.clone());
        let handle = PageHandle::new(Arc::new(session));
        Ok(Self { client, handle })
    }

    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        tracing::info!("Navigating to: {}", url);
        self.client
            .page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        ensure_helper(&self.client.page)
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        Ok(())
    }

    /// Handle shared by capture layers and evaluators.
    pub fn page(&self) -> PageHandle {
        self.handle.clone()
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    pub async fn close(self) -> Result<(), BrowserError> {
        self.client.close().await
    }
}

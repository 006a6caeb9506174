use crate::browser::BrowserError;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// A launched Chromium with one page and the task pumping its CDP handler.
pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub page: Page,
    user_data_dir: PathBuf,
    cleanup_user_data_dir: bool,
}

impl CdpClient {
    pub async fn launch(visible: bool) -> Result<Self, BrowserError> {
        let mut config_builder = BrowserConfig::builder().no_sandbox();
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir()?;
        config_builder = config_builder.user_data_dir(&user_data_dir);

        if visible {
            tracing::info!("Launching browser in visible mode");
            config_builder = config_builder.with_head();
        } else {
            tracing::info!("Launching browser in headless mode");
        }

        if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
            tracing::info!("Using custom Chrome binary: {}", chrome_bin);
            config_builder = config_builder.chrome_executable(chrome_bin);
        }

        let config = config_builder.build().map_err(BrowserError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error (ignoring): {}", e);
                }
            }
            tracing::info!("Browser handler task ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(format!("Failed to create page: {}", e)))?;

        let mut console_events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| BrowserError::Other(format!("Console subscription failed: {}", e)))?;
        tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                let args: Vec<String> = event
                    .args
                    .iter()
                    .map(|arg| arg.description.clone().unwrap_or_default())
                    .collect();
                tracing::debug!("Page console [{:?}]: {}", event.r#type, args.join(" "));
            }
        });

        // A blocking dialog would stall every helper call until the attempt
        // timeout, so dialogs are accepted as they open.
        let mut dialog_events = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| BrowserError::Other(format!("Dialog subscription failed: {}", e)))?;
        let dialog_page = page.clone();
        tokio::spawn(async move {
            while let Some(event) = dialog_events.next().await {
                tracing::info!("Accepting {:?} dialog: {}", event.r#type, event.message);
                if let Err(e) = dialog_page
                    .execute(HandleJavaScriptDialogParams::new(true))
                    .await
                {
                    tracing::warn!("Failed to accept dialog: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            page,
            user_data_dir,
            cleanup_user_data_dir,
        })
    }

    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::Other(format!("Error closing browser: {}", e)))?;
        self.handler_task
            .await
            .map_err(|e| BrowserError::Other(format!("Error awaiting handler: {}", e)))?;

        if self.cleanup_user_data_dir
            && let Err(e) = std::fs::remove_dir_all(&self.user_data_dir)
        {
            tracing::debug!(
                "Failed to clean up user-data-dir {}: {}",
                self.user_data_dir.display(),
                e
            );
        }
        Ok(())
    }
}

/// `RETRACE_USER_DATA_DIR` pins a persistent profile; otherwise each launch
/// gets a throwaway one that is removed on close.
fn resolve_user_data_dir() -> Result<(PathBuf, bool), BrowserError> {
    if let Ok(dir) = std::env::var("RETRACE_USER_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path)?;
        tracing::info!("Using user data dir from RETRACE_USER_DATA_DIR: {}", path.display());
        return Ok((path, false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let unique = format!("retrace-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::debug!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}

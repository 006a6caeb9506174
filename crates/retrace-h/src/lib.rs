//! Headless Chromium backend: a [`PageSession`](retrace_engine::PageSession)
//! driven over CDP.

pub mod browser;
pub mod cdp;
pub mod inject;
pub mod session;

pub use browser::{BrowserError, HeadlessBrowser};
pub use session::HeadlessSession;
